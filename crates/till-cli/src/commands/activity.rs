//! Activity log command

use anyhow::{anyhow, Result};
use till_core::db::Database;
use till_core::models::{ActivityFilter, Actor};

use super::truncate;

pub fn cmd_activity(db: &Database, actor: &Actor, filter: &ActivityFilter) -> Result<()> {
    if !actor.is_admin() {
        return Err(anyhow!("Admin access required to view activity (pass --admin)"));
    }

    let entries = db.list_activity(filter)?;
    if entries.is_empty() {
        println!("No activity recorded.");
        return Ok(());
    }

    println!();
    println!("📜 Activity ({})", entries.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for entry in &entries {
        println!(
            "   {} │ {:<10} │ {:<22} │ {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            truncate(&entry.actor, 10),
            entry.action,
            truncate(entry.details.as_deref().unwrap_or(""), 60)
        );
    }
    Ok(())
}
