//! Reimbursement commands

use anyhow::Result;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use till_core::db::Database;
use till_core::models::{Actor, NewReimbursement, Reimbursement, ReimbursementStatus};

fn print_reimbursement(r: &Reimbursement) {
    let status = match r.status {
        ReimbursementStatus::Pending => "⏳ pending",
        ReimbursementStatus::Approved => "✓ approved",
        ReimbursementStatus::Rejected => "✗ rejected",
    };
    let (date, amount, description) = match &r.ledger_entry {
        Some(e) => (
            e.entry_date.to_string(),
            format!("${}", e.amount),
            e.description.clone().unwrap_or_default(),
        ),
        None => ("?".to_string(), "?".to_string(), String::new()),
    };

    println!(
        "  #{:<5} {:<12} {} │ {:>10} │ {:<10} │ {}",
        r.id, status, date, amount, r.requested_by, description
    );
    if let Some(payout) = r.payout_date {
        println!(
            "         💸 Paid {} (approved by {})",
            payout,
            r.approved_by.as_deref().unwrap_or("?")
        );
    }
}

fn print_all(items: &[Reimbursement], empty: &str) {
    if items.is_empty() {
        println!("{}", empty);
        return;
    }
    for r in items {
        print_reimbursement(r);
    }
}

pub fn cmd_reimbursements_list(db: &Database, actor: &Actor) -> Result<()> {
    let items = db.list_my_reimbursements(actor)?;
    print_all(&items, "No reimbursement requests.");
    Ok(())
}

pub fn cmd_reimbursements_pending(db: &Database, actor: &Actor) -> Result<()> {
    let items = db.list_pending_reimbursements(actor)?;
    print_all(&items, "No pending reimbursements.");
    Ok(())
}

pub fn cmd_reimbursements_request(
    db: &Database,
    actor: &Actor,
    amount: Decimal,
    date: Option<NaiveDate>,
    description: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let r = db.request_reimbursement(
        actor,
        &NewReimbursement {
            entry_date: date,
            amount,
            description,
            label: None,
            receipt_id: None,
            notes,
        },
    )?;

    println!("✅ Requested reimbursement #{}:", r.id);
    print_reimbursement(&r);
    Ok(())
}

pub fn cmd_reimbursements_approve(db: &Database, actor: &Actor, id: i64) -> Result<()> {
    let r = db.approve_reimbursement(actor, id, Local::now().date_naive())?;
    println!("✅ Approved reimbursement #{}:", id);
    print_reimbursement(&r);
    Ok(())
}

pub fn cmd_reimbursements_reject(db: &Database, actor: &Actor, id: i64) -> Result<()> {
    let r = db.reject_reimbursement(actor, id)?;
    println!("Rejected reimbursement #{}:", id);
    print_reimbursement(&r);
    Ok(())
}
