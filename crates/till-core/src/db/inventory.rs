//! Inventory operations

use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::debug;

use super::ledger::clean_text;
use super::{now_timestamp, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Actor, InventoryItem, ReceiptLineItem};

const ITEM_COLUMNS: &str =
    "id, name, quantity, unit, last_edited_by, last_edited_at, created_at";

fn parse_quantity(idx: usize, s: &str) -> rusqlite::Result<Decimal> {
    s.parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Database {
    /// List inventory ordered by name
    pub fn list_inventory(&self) -> Result<Vec<InventoryItem>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM inventory_items ORDER BY name COLLATE NOCASE ASC",
            ITEM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Find an item by name (case-insensitive)
    pub fn get_inventory_item_by_name(&self, name: &str) -> Result<Option<InventoryItem>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM inventory_items WHERE name = ? COLLATE NOCASE",
            ITEM_COLUMNS
        );
        let item = conn
            .query_row(&sql, params![name.trim()], Self::row_to_item)
            .optional()?;
        Ok(item)
    }

    /// Create a new inventory item; names are unique
    pub fn create_inventory_item(
        &self,
        actor: &Actor,
        name: &str,
        quantity: Decimal,
        unit: Option<&str>,
    ) -> Result<InventoryItem> {
        let name = clean_text(Some(name))
            .ok_or_else(|| Error::InvalidData("Name is required".to_string()))?;
        if self.get_inventory_item_by_name(&name)?.is_some() {
            return Err(Error::InvalidData(format!("Item already exists: {}", name)));
        }

        let now = now_timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO inventory_items (name, quantity, unit, last_edited_by, last_edited_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                name,
                quantity.to_string(),
                clean_text(unit),
                actor.id,
                now,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.record_activity(
            &actor.id,
            "inventory.create",
            "inventory",
            id,
            &format!("Added item: {} (qty {})", name, quantity),
        );
        self.require_item(id)
    }

    /// Set an item's quantity
    pub fn set_inventory_quantity(
        &self,
        actor: &Actor,
        id: i64,
        quantity: Decimal,
    ) -> Result<InventoryItem> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE inventory_items SET quantity = ?, last_edited_by = ?, last_edited_at = ? WHERE id = ?",
            params![quantity.to_string(), actor.id, now_timestamp(), id],
        )?;
        drop(conn);
        if changed == 0 {
            return Err(Error::NotFound(format!("Inventory item {}", id)));
        }

        let item = self.require_item(id)?;
        self.record_activity(
            &actor.id,
            "inventory.update",
            "inventory",
            id,
            &format!("Updated {} to qty {}", item.name, item.quantity),
        );
        Ok(item)
    }

    /// Remove an item
    pub fn delete_inventory_item(&self, actor: &Actor, id: i64) -> Result<()> {
        let item = self.require_item(id)?;
        let conn = self.conn()?;
        conn.execute("DELETE FROM inventory_items WHERE id = ?", params![id])?;
        drop(conn);

        self.record_activity(
            &actor.id,
            "inventory.delete",
            "inventory",
            id,
            &format!("Removed item: {}", item.name),
        );
        Ok(())
    }

    /// Add receipt line items to inventory
    ///
    /// Existing names (case-insensitive) have their quantity increased; unnamed
    /// items are skipped and a missing quantity counts as one. All items are
    /// applied in one transaction.
    pub fn add_receipt_items(&self, actor: &Actor, items: &[ReceiptLineItem]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_timestamp();
        let mut applied = 0;

        for item in items {
            let Some(name) = clean_text(Some(&item.name)) else {
                continue;
            };
            let quantity = item.quantity.unwrap_or(Decimal::ONE);

            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, quantity FROM inventory_items WHERE name = ? COLLATE NOCASE",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((id, current)) => {
                    let current = parse_quantity(1, &current)?;
                    tx.execute(
                        "UPDATE inventory_items SET quantity = ?, last_edited_by = ?, last_edited_at = ? WHERE id = ?",
                        params![(current + quantity).to_string(), actor.id, now, id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO inventory_items (name, quantity, last_edited_by, last_edited_at, created_at)
                         VALUES (?, ?, ?, ?, ?)",
                        params![name, quantity.to_string(), actor.id, now, now],
                    )?;
                }
            }
            applied += 1;
        }

        tx.commit()?;
        debug!(applied, "Added receipt items to inventory");
        Ok(applied)
    }

    fn require_item(&self, id: i64) -> Result<InventoryItem> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM inventory_items WHERE id = ?", ITEM_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_item)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Inventory item {}", id)))
    }

    fn row_to_item(row: &Row) -> rusqlite::Result<InventoryItem> {
        let quantity: String = row.get(2)?;
        let last_edited_at: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;

        Ok(InventoryItem {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: parse_quantity(2, &quantity)?,
            unit: row.get(3)?,
            last_edited_by: row.get(4)?,
            last_edited_at: last_edited_at.as_deref().map(parse_datetime),
            created_at: parse_datetime(&created_at),
        })
    }
}
