//! Inventory commands

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use till_core::db::Database;
use till_core::models::Actor;

use super::truncate;

pub fn cmd_inventory_list(db: &Database) -> Result<()> {
    let items = db.list_inventory()?;

    if items.is_empty() {
        println!("No inventory items. Add one with:");
        println!("  till inventory add \"Paper cups\" --quantity 100");
        return Ok(());
    }

    println!();
    println!("📦 Inventory ({})", items.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for item in &items {
        println!(
            "   [{}] {:<30} │ {:>8} {:<6} │ {}",
            item.id,
            truncate(&item.name, 30),
            item.quantity,
            item.unit.as_deref().unwrap_or(""),
            item.last_edited_by.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn require_non_negative(quantity: Decimal) -> Result<Decimal> {
    if quantity.is_sign_negative() {
        return Err(anyhow!("Quantity cannot be negative"));
    }
    Ok(quantity)
}

pub fn cmd_inventory_add(
    db: &Database,
    actor: &Actor,
    name: &str,
    quantity: Decimal,
    unit: Option<&str>,
) -> Result<()> {
    let item = db.create_inventory_item(actor, name, require_non_negative(quantity)?, unit)?;
    println!("✅ Added {} (#{}), qty {}", item.name, item.id, item.quantity);
    Ok(())
}

pub fn cmd_inventory_set(db: &Database, actor: &Actor, id: i64, quantity: Decimal) -> Result<()> {
    let item = db.set_inventory_quantity(actor, id, require_non_negative(quantity)?)?;
    println!("✅ {} is now {}", item.name, item.quantity);
    Ok(())
}

pub fn cmd_inventory_remove(db: &Database, actor: &Actor, id: i64) -> Result<()> {
    db.delete_inventory_item(actor, id)?;
    println!("🗑️  Removed item {}", id);
    Ok(())
}
