//! Integration tests for till-core
//!
//! These tests exercise the full summary → resolve → edit/delete workflow and the
//! upload → review → confirm ingestion flow against a real database.

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use till_core::{
    ai::{ExtractedReceipt, MockExtractor},
    db::Database,
    ingest::{DirImageStore, IngestState, Ingestion},
    models::{
        Actor, Category, DateRange, EntryPatch, EntryStatus, NewLedgerEntry, ReceiptStatus,
    },
    reconcile::{self, DeletePolicy, ReconcileError, Resolution, TieBreak},
    summary::{aggregate, NetProfitFormula, SummaryKey},
};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn entry(day: &str, category: Category, amount: rust_decimal::Decimal, label: Option<&str>) -> NewLedgerEntry {
    NewLedgerEntry {
        entry_date: Some(date(day)),
        category,
        amount,
        description: None,
        label: label.map(String::from),
        receipt_id: None,
        status: EntryStatus::Approved,
    }
}

/// Ledger for two workers over two days
fn seeded_db() -> Database {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let ana = Actor::worker("ana");
    let ben = Actor::worker("ben");

    db.create_entry(&ana, &entry("2024-03-01", Category::Sales, dec!(100), None))
        .unwrap();
    db.create_entry(&ana, &entry("2024-03-01", Category::Expense, dec!(20), None))
        .unwrap();
    db.create_entry(&ben, &entry("2024-03-02", Category::Expense, dec!(5), Some("lunch")))
        .unwrap();
    db.create_entry(&ben, &entry("2024-03-02", Category::Expense, dec!(7), Some("lunch")))
        .unwrap();
    db
}

// =============================================================================
// Summary and reconciliation
// =============================================================================

#[test]
fn test_summary_rows_resolve_to_their_members() {
    let db = seeded_db();
    let range = DateRange::new(date("2024-03-01"), date("2024-03-31"));
    let formula = NetProfitFormula::default();

    let summary = db.daily_summary(&range, &formula).unwrap();
    let entries = db.list_entries(&range).unwrap();
    assert_eq!(summary, aggregate(&entries, &range, &formula));

    for row in &summary.rows {
        let resolution = reconcile::resolve_row(&db, &row.key).unwrap();
        assert!(!resolution.is_empty());
        for member in resolution.entries() {
            assert_eq!(SummaryKey::of(member), row.key);
        }
        let total: rust_decimal::Decimal = resolution.entries().iter().map(|e| e.amount).sum();
        let row_total: rust_decimal::Decimal = Category::ALL.iter().map(|c| row.totals.get(*c)).sum();
        assert_eq!(total, row_total);
    }
}

#[test]
fn test_edit_unique_row_updates_the_entry() {
    let db = seeded_db();
    let ana = Actor::worker("ana");
    let range = DateRange::day(date("2024-03-01"));

    // ana's 2024-03-01 row has two members, so narrow it with a label first
    let key = SummaryKey::new(date("2024-03-01"), "ana", None);
    assert!(matches!(
        reconcile::resolve_row(&db, &key).unwrap(),
        Resolution::Ambiguous(_)
    ));

    let sales = db
        .list_entries(&range)
        .unwrap()
        .into_iter()
        .find(|e| e.category == Category::Sales)
        .unwrap();
    db.update_entry(
        &ana,
        sales.id,
        &EntryPatch {
            label: Some("morning".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let morning = SummaryKey::new(date("2024-03-01"), "ana", Some("morning"));
    let updated = reconcile::edit_row(
        &db,
        &ana,
        &morning,
        &EntryPatch {
            amount: Some(dec!(120)),
            ..Default::default()
        },
        TieBreak::Reject,
    )
    .unwrap();
    assert_eq!(updated.id, sales.id);

    let summary = db.daily_summary(&range, &NetProfitFormula::default()).unwrap();
    assert_eq!(summary.row(&morning).unwrap().totals.sales, dec!(120));
    assert_eq!(summary.totals.unwrap().net_profit, dec!(100));
}

#[test]
fn test_ambiguous_edit_is_surfaced_then_tie_broken() {
    let db = seeded_db();
    let ben = Actor::worker("ben");
    let key = SummaryKey::new(date("2024-03-02"), "ben", Some("lunch"));
    let patch = EntryPatch {
        amount: Some(dec!(6)),
        ..Default::default()
    };

    match reconcile::edit_row(&db, &ben, &key, &patch, TieBreak::Reject) {
        Err(ReconcileError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("expected ambiguity, got {:?}", other),
    }
    // nothing changed
    let summary = db
        .daily_summary(&DateRange::day(date("2024-03-02")), &NetProfitFormula::default())
        .unwrap();
    assert_eq!(summary.row(&key).unwrap().totals.expense, dec!(12));

    let edited = reconcile::edit_row(&db, &ben, &key, &patch, TieBreak::EarliestCreated).unwrap();
    let members = match reconcile::resolve_row(&db, &key).unwrap() {
        Resolution::Ambiguous(members) => members,
        other => panic!("expected two members, got {:?}", other),
    };
    assert_eq!(members[0].id, edited.id);
    assert_eq!(members[0].amount, dec!(6));
    assert_eq!(members[1].amount, dec!(7));
}

#[test]
fn test_stale_row_fails_without_mutation() {
    let db = seeded_db();
    let ben = Actor::worker("ben");
    let key = SummaryKey::new(date("2024-03-02"), "ben", Some("lunch"));

    // the row's entries disappear after the summary was read
    let report = reconcile::delete_row(&db, &ben, &key, DeletePolicy::StopOnFirstFailure).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.deleted.len(), 2);

    assert!(matches!(
        reconcile::resolve_row(&db, &key).unwrap(),
        Resolution::NoMatch
    ));
    assert!(matches!(
        reconcile::edit_row(&db, &ben, &key, &EntryPatch::default(), TieBreak::Reject),
        Err(ReconcileError::NoMatchingEntries(_))
    ));
    assert!(matches!(
        reconcile::delete_row(&db, &ben, &key, DeletePolicy::ContinueOnFailure),
        Err(ReconcileError::NoMatchingEntries(_))
    ));
    assert_eq!(
        db.list_entries(&DateRange::unbounded()).unwrap().len(),
        2
    );
}

#[test]
fn test_row_delete_reports_per_member_failures() {
    let db = seeded_db();
    let intruder = Actor::worker("carl");
    let key = SummaryKey::new(date("2024-03-01"), "ana", None);

    let report =
        reconcile::delete_row(&db, &intruder, &key, DeletePolicy::StopOnFirstFailure).unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.not_attempted.len(), 1);
    assert!(!report.is_partial());

    let report =
        reconcile::delete_row(&db, &intruder, &key, DeletePolicy::ContinueOnFailure).unwrap();
    assert_eq!(report.failed.len(), 2);
    assert!(report.not_attempted.is_empty());

    let report =
        reconcile::delete_row(&db, &Actor::admin("boss"), &key, DeletePolicy::default()).unwrap();
    assert!(report.is_complete());
    assert_eq!(db.list_entries(&DateRange::unbounded()).unwrap().len(), 2);
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_receipt_confirm_feeds_daily_summary() {
    let db = Database::in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let images = DirImageStore::new(dir.path());
    let extractor = MockExtractor::with_receipt(ExtractedReceipt {
        merchant_name: Some("Acme".into()),
        transaction_date: Some("2024-03-03".into()),
        total_amount: Some(dec!(12.5)),
        category_suggestion: Some("ministry_fund".into()),
        ..Default::default()
    });
    let ana = Actor::worker("ana");
    let range = DateRange::day(date("2024-03-03"));
    let formula = NetProfitFormula::default();

    let mut ingest = Ingestion::new(&db, &db, &images, &extractor, ana.clone());
    ingest
        .upload("receipt.jpg", b"not really a jpeg", &mut |_| {})
        .await
        .unwrap();

    // unconfirmed receipts do not touch totals
    assert!(db.daily_summary(&range, &formula).unwrap().is_empty());

    let IngestState::Review { receipt_id, mut form } = ingest.state().clone() else {
        panic!("expected review, got {:?}", ingest.state());
    };
    assert_eq!(form.category, Category::MinistryFund);
    form.amount = Some(dec!(15.0));
    form.label = Some("outreach".into());
    let (_, created) = ingest.confirm(form).unwrap();

    let summary = db.daily_summary(&range, &formula).unwrap();
    let row = summary
        .row(&SummaryKey::new(date("2024-03-03"), "ana", Some("outreach")))
        .unwrap();
    assert_eq!(row.totals.ministry_fund, dec!(15));
    assert_eq!(row.totals.net_profit, dec!(-15));

    let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Processed);
    assert_eq!(receipt.ledger_entry_id, Some(created.id));
    assert_eq!(db.search_receipts(&ana, "acme").unwrap().len(), 1);
}
