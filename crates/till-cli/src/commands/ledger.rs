//! Ledger entry and daily summary commands

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use till_core::db::Database;
use till_core::models::{
    Actor, Category, DateRange, EntryPatch, EntryStatus, LedgerEntry, NewLedgerEntry,
};
use till_core::summary::{CategoryTotals, NetProfitFormula};

use super::truncate;

pub(crate) fn print_entry(entry: &LedgerEntry) {
    println!(
        "   [{}] {} │ {:<13} │ {:>10} │ {:<8} │ {:<10} │ {}",
        entry.id,
        entry.entry_date,
        entry.category.as_str(),
        format!("${}", entry.amount),
        entry.status.as_str(),
        truncate(&entry.created_by, 10),
        truncate(
            &[entry.label.as_deref(), entry.description.as_deref()]
                .iter()
                .flatten()
                .copied()
                .collect::<Vec<_>>()
                .join(" · "),
            40
        )
    );
}

pub fn cmd_ledger_list(db: &Database, range: &DateRange) -> Result<()> {
    let entries = db.list_entries(range)?;

    if entries.is_empty() {
        println!("No ledger entries found. Record one with:");
        println!("  till ledger add --category sales --amount 120");
        return Ok(());
    }

    println!();
    println!("📒 Ledger Entries ({})", entries.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for entry in &entries {
        print_entry(entry);
    }

    Ok(())
}

pub fn cmd_ledger_add(
    db: &Database,
    actor: &Actor,
    category: Category,
    amount: Decimal,
    date: Option<NaiveDate>,
    description: Option<String>,
    label: Option<String>,
) -> Result<()> {
    let entry = db.create_entry(
        actor,
        &NewLedgerEntry {
            entry_date: date,
            category,
            amount,
            description,
            label,
            receipt_id: None,
            status: EntryStatus::Approved,
        },
    )?;

    println!("✅ Recorded entry {}:", entry.id);
    print_entry(&entry);
    Ok(())
}

pub fn cmd_ledger_edit(db: &Database, actor: &Actor, id: i64, patch: EntryPatch) -> Result<()> {
    if patch.is_empty() {
        println!("Nothing to change. Pass --amount, --category, --set-date, --description, --set-label or --status.");
        return Ok(());
    }

    let entry = db.update_entry(actor, id, &patch)?;
    println!("✅ Updated entry {}:", id);
    print_entry(&entry);
    Ok(())
}

pub fn cmd_ledger_delete(db: &Database, actor: &Actor, id: i64) -> Result<()> {
    let entry = db
        .get_entry(id)?
        .ok_or_else(|| anyhow::anyhow!("Ledger entry {} not found", id))?;

    db.delete_entry(actor, id)?;
    println!("🗑️  Deleted entry {}:", id);
    print_entry(&entry);
    Ok(())
}

fn totals_columns(totals: &CategoryTotals) -> String {
    Category::ALL
        .iter()
        .map(|c| format!("{:>10}", totals.get(*c)))
        .collect::<Vec<_>>()
        .join(" │ ")
}

pub fn cmd_summary(db: &Database, range: &DateRange) -> Result<()> {
    let formula = NetProfitFormula::from_env()?;
    let summary = db.daily_summary(range, &formula)?;

    let Some(totals) = summary.totals else {
        println!("No approved entries in this range.");
        return Ok(());
    };

    let header = Category::ALL
        .iter()
        .map(|c| format!("{:>10}", truncate(c.as_str(), 10)))
        .collect::<Vec<_>>()
        .join(" │ ");

    println!();
    println!("📊 Daily Summary");
    println!(
        "   {:<10} │ {:<10} │ {:<12} │ {} │ {:>10}",
        "date", "user", "label", header, "net"
    );
    println!("   {}", "─".repeat(40 + 13 * Category::ALL.len() + 10));
    for row in &summary.rows {
        println!(
            "   {} │ {:<10} │ {:<12} │ {} │ {:>10}",
            row.key.entry_date,
            truncate(&row.key.created_by, 10),
            truncate(&row.key.label, 12),
            totals_columns(&row.totals),
            row.totals.net_profit
        );
    }
    println!("   {}", "─".repeat(40 + 13 * Category::ALL.len() + 10));
    println!(
        "   {:<10} │ {:<10} │ {:<12} │ {} │ {:>10}",
        "TOTAL",
        "",
        "",
        totals_columns(&totals),
        totals.net_profit
    );
    println!();
    println!("   Edit a row with: till row edit --date <date> --user <user> [--label <label>] --amount <amount>");

    Ok(())
}
