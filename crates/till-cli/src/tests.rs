//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use chrono::NaiveDate;
use clap::Parser;
use rust_decimal_macros::dec;
use till_core::ai::{ExtractedReceipt, MockExtractor};
use till_core::db::Database;
use till_core::ingest::DirImageStore;
use till_core::models::{
    Actor, ActivityFilter, Category, DateRange, EntryPatch, EntryStatus, NewLedgerEntry,
    ReceiptStatus,
};
use till_core::reconcile::{DeletePolicy, TieBreak};
use till_core::summary::SummaryKey;

use crate::cli::{Cli, Commands, RowAction};
use crate::commands::{self, truncate, FormOverrides};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn seed(db: &Database, user: &str, day: &str, category: Category, amount: rust_decimal::Decimal) -> i64 {
    db.create_entry(
        &Actor::worker(user),
        &NewLedgerEntry {
            entry_date: Some(date(day)),
            category,
            amount,
            description: None,
            label: None,
            receipt_id: None,
            status: EntryStatus::Approved,
        },
    )
    .unwrap()
    .id
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_row_edit() {
    let cli = Cli::try_parse_from([
        "till", "--as", "ana", "row", "edit", "--date", "2024-03-01", "--user", "ana",
        "--amount", "12.50", "--earliest",
    ])
    .unwrap();
    assert_eq!(cli.as_user, "ana");
    assert!(!cli.admin);

    let Commands::Row {
        action: RowAction::Edit {
            key,
            patch,
            earliest,
        },
    } = cli.command
    else {
        panic!("expected row edit");
    };
    assert_eq!(key.key(), SummaryKey::new(date("2024-03-01"), "ana", None));
    assert_eq!(patch.amount, Some(dec!(12.50)));
    assert!(earliest);
}

#[test]
fn test_parse_rejects_unknown_category() {
    let result = Cli::try_parse_from(["till", "ledger", "add", "-c", "snacks", "-a", "5"]);
    assert!(result.is_err());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer string", 10), "a much ...");
    assert_eq!(truncate("ünïcödé text", 8), "ünïcö...");
}

// ========== Core Command Tests ==========

#[test]
fn test_open_db_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("till.db");

    let db = commands::open_db(&path, true).unwrap();
    assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());
    assert!(path.exists());
}

#[test]
fn test_cmd_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("till.db");
    assert!(commands::cmd_init(&path, true).is_ok());
}

// ========== Ledger Command Tests ==========

#[test]
fn test_cmd_ledger_add_edit_delete() {
    let db = setup_test_db();
    let ana = Actor::worker("ana");

    commands::cmd_ledger_add(
        &db,
        &ana,
        Category::Sales,
        dec!(120),
        Some(date("2024-03-01")),
        None,
        Some("morning".into()),
    )
    .unwrap();
    let entries = db.list_entries(&DateRange::unbounded()).unwrap();
    assert_eq!(entries.len(), 1);
    let id = entries[0].id;
    assert_eq!(entries[0].created_by, "ana");

    commands::cmd_ledger_edit(
        &db,
        &ana,
        id,
        EntryPatch {
            amount: Some(dec!(130)),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(db.get_entry(id).unwrap().unwrap().amount, dec!(130));

    // an empty patch is a no-op
    assert!(commands::cmd_ledger_edit(&db, &ana, id, EntryPatch::default()).is_ok());

    assert!(commands::cmd_ledger_delete(&db, &Actor::worker("ben"), id).is_err());
    commands::cmd_ledger_delete(&db, &ana, id).unwrap();
    assert!(db.get_entry(id).unwrap().is_none());
}

#[test]
fn test_cmd_ledger_add_rejects_zero() {
    let db = setup_test_db();
    let result = commands::cmd_ledger_add(
        &db,
        &Actor::worker("ana"),
        Category::Expense,
        dec!(0),
        None,
        None,
        None,
    );
    assert!(result.is_err());
}

#[test]
fn test_cmd_summary() {
    let db = setup_test_db();
    assert!(commands::cmd_summary(&db, &DateRange::unbounded()).is_ok());

    seed(&db, "ana", "2024-03-01", Category::Sales, dec!(100));
    seed(&db, "ana", "2024-03-01", Category::Expense, dec!(20));
    assert!(commands::cmd_summary(&db, &DateRange::unbounded()).is_ok());
    assert!(commands::cmd_ledger_list(&db, &DateRange::day(date("2024-03-01"))).is_ok());
}

// ========== Row Command Tests ==========

#[test]
fn test_cmd_row_edit_ambiguous_changes_nothing() {
    let db = setup_test_db();
    let ana = Actor::worker("ana");
    let first = seed(&db, "ana", "2024-03-01", Category::Expense, dec!(5));
    let second = seed(&db, "ana", "2024-03-01", Category::Expense, dec!(7));
    let key = SummaryKey::new(date("2024-03-01"), "ana", None);
    let patch = EntryPatch {
        amount: Some(dec!(6)),
        ..Default::default()
    };

    assert!(commands::cmd_row_resolve(&db, &key).is_ok());
    assert!(commands::cmd_row_edit(&db, &ana, &key, &patch, TieBreak::Reject).is_err());
    assert_eq!(db.get_entry(first).unwrap().unwrap().amount, dec!(5));
    assert_eq!(db.get_entry(second).unwrap().unwrap().amount, dec!(7));

    commands::cmd_row_edit(&db, &ana, &key, &patch, TieBreak::EarliestCreated).unwrap();
    assert_eq!(db.get_entry(first).unwrap().unwrap().amount, dec!(6));
    assert_eq!(db.get_entry(second).unwrap().unwrap().amount, dec!(7));
}

#[test]
fn test_cmd_row_delete() {
    let db = setup_test_db();
    seed(&db, "ana", "2024-03-01", Category::Sales, dec!(100));
    seed(&db, "ana", "2024-03-01", Category::Expense, dec!(20));
    let key = SummaryKey::new(date("2024-03-01"), "ana", None);

    // another worker fails and nothing is removed
    let result = commands::cmd_row_delete(
        &db,
        &Actor::worker("ben"),
        &key,
        DeletePolicy::ContinueOnFailure,
    );
    assert!(result.is_err());
    assert_eq!(db.list_entries(&DateRange::unbounded()).unwrap().len(), 2);

    commands::cmd_row_delete(&db, &Actor::admin("boss"), &key, DeletePolicy::default()).unwrap();
    assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());

    // the row is now stale
    assert!(commands::cmd_row_resolve(&db, &key).is_ok());
    assert!(
        commands::cmd_row_delete(&db, &Actor::admin("boss"), &key, DeletePolicy::default())
            .is_err()
    );
}

// ========== Receipt Command Tests ==========

#[tokio::test]
async fn test_cmd_receipts_upload_and_confirm() {
    let db = setup_test_db();
    let ana = Actor::worker("ana");
    let dir = tempfile::tempdir().unwrap();
    let images = DirImageStore::new(dir.path().join("receipts"));
    let file = dir.path().join("receipt.jpg");
    std::fs::write(&file, b"jpeg bytes").unwrap();

    let extractor = MockExtractor::with_receipt(ExtractedReceipt {
        merchant_name: Some("Corner Market".into()),
        transaction_date: Some("2024-03-03".into()),
        total_amount: Some(dec!(12.50)),
        ..Default::default()
    });
    commands::upload_with(&db, &ana, &file, &images, &extractor)
        .await
        .unwrap();

    let receipts = db.list_receipts(&ana).unwrap();
    assert_eq!(receipts.len(), 1);
    let id = receipts[0].id;
    assert_eq!(receipts[0].status, ReceiptStatus::Pending);

    commands::cmd_receipts_confirm(
        &db,
        &ana,
        id,
        FormOverrides {
            amount: Some(dec!(13)),
            label: Some("groceries".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let receipt = db.get_receipt(id).unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Processed);
    let entry = db.get_entry(receipt.ledger_entry_id.unwrap()).unwrap().unwrap();
    assert_eq!(entry.amount, dec!(13));
    assert_eq!(entry.entry_date, date("2024-03-03"));
    assert_eq!(entry.description.as_deref(), Some("Corner Market"));
    assert_eq!(entry.label.as_deref(), Some("groceries"));

    // already processed
    assert!(commands::cmd_receipts_confirm(&db, &ana, id, FormOverrides::default()).is_err());
    assert!(commands::cmd_receipts_search(&db, &ana, "corner").is_ok());
    assert!(commands::cmd_receipts_list(&db, &ana).is_ok());
}

#[tokio::test]
async fn test_cmd_receipts_upload_rejects_missing_file() {
    let db = setup_test_db();
    let dir = tempfile::tempdir().unwrap();
    let images = DirImageStore::new(dir.path());
    let extractor = MockExtractor::new();

    let result = commands::upload_with(
        &db,
        &Actor::worker("ana"),
        &dir.path().join("missing.jpg"),
        &images,
        &extractor,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(extractor.calls(), 0);
}

#[test]
fn test_cmd_receipts_confirm_other_users_receipt() {
    let db = setup_test_db();
    let result = commands::cmd_receipts_confirm(
        &db,
        &Actor::worker("ana"),
        999,
        FormOverrides::default(),
    );
    assert!(result.is_err());
}

// ========== Reimbursement Command Tests ==========

#[test]
fn test_cmd_reimbursements_flow() {
    let db = setup_test_db();
    let ana = Actor::worker("ana");
    let boss = Actor::admin("boss");

    commands::cmd_reimbursements_request(
        &db,
        &ana,
        dec!(30),
        Some(date("2024-03-05")),
        Some("Gas".into()),
        None,
    )
    .unwrap();
    let mine = db.list_my_reimbursements(&ana).unwrap();
    assert_eq!(mine.len(), 1);
    let id = mine[0].id;

    assert!(commands::cmd_reimbursements_pending(&db, &ana).is_err());
    assert!(commands::cmd_reimbursements_pending(&db, &boss).is_ok());
    assert!(commands::cmd_reimbursements_approve(&db, &ana, id).is_err());

    commands::cmd_reimbursements_approve(&db, &boss, id).unwrap();
    let approved = db.get_reimbursement(id).unwrap().unwrap();
    assert!(approved.payout_date.is_some());
    assert!(commands::cmd_reimbursements_reject(&db, &boss, id).is_err());
    assert!(commands::cmd_reimbursements_list(&db, &ana).is_ok());
}

// ========== Inventory and Activity Command Tests ==========

#[test]
fn test_cmd_inventory() {
    let db = setup_test_db();
    let ana = Actor::worker("ana");

    assert!(commands::cmd_inventory_add(&db, &ana, "Cups", dec!(-1), None).is_err());
    commands::cmd_inventory_add(&db, &ana, "Cups", dec!(50), Some("pcs")).unwrap();
    let id = db.list_inventory().unwrap()[0].id;

    commands::cmd_inventory_set(&db, &ana, id, dec!(42)).unwrap();
    assert_eq!(db.list_inventory().unwrap()[0].quantity, dec!(42));
    assert!(commands::cmd_inventory_list(&db).is_ok());

    commands::cmd_inventory_remove(&db, &ana, id).unwrap();
    assert!(db.list_inventory().unwrap().is_empty());
}

#[test]
fn test_cmd_activity_requires_admin() {
    let db = setup_test_db();
    seed(&db, "ana", "2024-03-01", Category::Sales, dec!(100));

    let filter = ActivityFilter::default();
    assert!(commands::cmd_activity(&db, &Actor::worker("ana"), &filter).is_err());
    assert!(commands::cmd_activity(&db, &Actor::admin("boss"), &filter).is_ok());
}
