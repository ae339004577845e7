//! Summary row commands
//!
//! A row is addressed by the key printed by `till summary`; the resolver maps it
//! back to the ledger entries behind it.

use anyhow::{anyhow, Result};
use till_core::db::Database;
use till_core::models::{Actor, EntryPatch};
use till_core::reconcile::{self, DeletePolicy, ReconcileError, Resolution, TieBreak};
use till_core::summary::SummaryKey;

use super::ledger::print_entry;

fn describe(key: &SummaryKey) -> String {
    if key.label.is_empty() {
        format!("{} / {}", key.entry_date, key.created_by)
    } else {
        format!("{} / {} / {}", key.entry_date, key.created_by, key.label)
    }
}

pub fn cmd_row_resolve(db: &Database, key: &SummaryKey) -> Result<()> {
    let resolution = reconcile::resolve_row(db, key)?;

    match &resolution {
        Resolution::NoMatch => {
            println!("No entries match row {}. Refresh with 'till summary'.", describe(key));
            return Ok(());
        }
        Resolution::Unique(_) => println!("Row {} has one entry:", describe(key)),
        Resolution::Ambiguous(entries) => println!(
            "Row {} has {} entries (edits need --earliest or a narrower label):",
            describe(key),
            entries.len()
        ),
    }
    for entry in resolution.entries() {
        print_entry(entry);
    }
    Ok(())
}

pub fn cmd_row_edit(
    db: &Database,
    actor: &Actor,
    key: &SummaryKey,
    patch: &EntryPatch,
    tie_break: TieBreak,
) -> Result<()> {
    if patch.is_empty() {
        println!("Nothing to change. Pass --amount, --category, --set-date, --description, --set-label or --status.");
        return Ok(());
    }

    match reconcile::edit_row(db, actor, key, patch, tie_break) {
        Ok(entry) => {
            println!("✅ Updated entry {} behind row {}:", entry.id, describe(key));
            print_entry(&entry);
            Ok(())
        }
        Err(ReconcileError::Ambiguous { candidates, .. }) => {
            println!(
                "⚠️  Row {} matches {} entries; nothing was changed:",
                describe(key),
                candidates.len()
            );
            for entry in &candidates {
                print_entry(entry);
            }
            println!();
            println!("   Edit one directly with 'till ledger edit <id>' or pass --earliest.");
            Err(anyhow!("Ambiguous row"))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn cmd_row_delete(
    db: &Database,
    actor: &Actor,
    key: &SummaryKey,
    policy: DeletePolicy,
) -> Result<()> {
    let report = reconcile::delete_row(db, actor, key, policy)?;

    for id in &report.deleted {
        println!("   🗑️  Deleted entry {}", id);
    }
    for failed in &report.failed {
        println!("   ❌ Entry {}: {}", failed.id, failed.error);
    }
    for id in &report.not_attempted {
        println!("   ⏭️  Entry {} not attempted", id);
    }

    if report.is_complete() {
        println!("✅ Deleted row {} ({} entries)", describe(key), report.deleted.len());
        Ok(())
    } else {
        Err(anyhow!(
            "Row {} was not fully deleted ({} deleted, {} failed, {} not attempted)",
            describe(key),
            report.deleted.len(),
            report.failed.len(),
            report.not_attempted.len()
        ))
    }
}
