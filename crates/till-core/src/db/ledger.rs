//! Ledger entry operations

use chrono::Local;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::{now_timestamp, parse_date, parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{Actor, Category, DateRange, EntryPatch, LedgerEntry, NewLedgerEntry};
use crate::money;
use crate::summary::{CategoryTotals, DailySummary, DailySummaryRow, NetProfitFormula, SummaryKey};

const ENTRY_COLUMNS: &str = "id, entry_date, category, amount_cents, description, label, \
                             receipt_id, created_by, status, created_at";

/// Trim optional text, treating an empty result as absent
pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl Database {
    /// Create a ledger entry owned by `actor`
    ///
    /// A missing date defaults to today (local calendar).
    pub fn create_entry(&self, actor: &Actor, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        let entry_date = entry
            .entry_date
            .unwrap_or_else(|| Local::now().date_naive());
        let amount = money::require_positive(entry.amount)?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO ledger_entries
                (entry_date, category, amount_cents, description, label, receipt_id, created_by, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry_date.to_string(),
                entry.category.as_str(),
                money::to_cents(amount)?,
                clean_text(entry.description.as_deref()),
                clean_text(entry.label.as_deref()),
                entry.receipt_id,
                actor.id,
                entry.status.as_str(),
                now_timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        info!(id, category = entry.category.as_str(), %amount, "Created ledger entry");
        self.record_activity(
            &actor.id,
            "ledger.create",
            "ledger",
            id,
            &format!("Entry #{}: {} ${}", id, entry.category, amount),
        );

        self.require_entry(id)
    }

    /// Get a ledger entry by ID
    pub fn get_entry(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM ledger_entries WHERE id = ?", ENTRY_COLUMNS);
        let entry = conn
            .query_row(&sql, params![id], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    fn require_entry(&self, id: i64) -> Result<LedgerEntry> {
        self.get_entry(id)?
            .ok_or_else(|| Error::NotFound(format!("Ledger entry {}", id)))
    }

    /// List entries of every status whose date falls in `range`
    ///
    /// Ordered by date, then creation time, then id.
    pub fn list_entries(&self, range: &DateRange) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE (?1 IS NULL OR entry_date >= ?1)
              AND (?2 IS NULL OR entry_date <= ?2)
            ORDER BY entry_date ASC, created_at ASC, id ASC
            "#,
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params![
                    range.start.map(|d| d.to_string()),
                    range.end.map(|d| d.to_string())
                ],
                Self::row_to_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Apply a partial update
    ///
    /// Allowed to the entry's creator or an admin. Changing `status` is admin-only.
    pub fn update_entry(&self, actor: &Actor, id: i64, patch: &EntryPatch) -> Result<LedgerEntry> {
        let mut entry = self.require_entry(id)?;
        if !actor.can_modify(&entry) {
            return Err(Error::PermissionDenied(format!(
                "{} may not modify ledger entry {}",
                actor.id, id
            )));
        }
        if patch.status.is_some_and(|s| s != entry.status) && !actor.is_admin() {
            return Err(Error::PermissionDenied(
                "Only admins may change entry status".to_string(),
            ));
        }

        if let Some(date) = patch.entry_date {
            entry.entry_date = date;
        }
        if let Some(category) = patch.category {
            entry.category = category;
        }
        if let Some(amount) = patch.amount {
            entry.amount = money::require_positive(amount)?;
        }
        if let Some(description) = patch.description.as_deref() {
            entry.description = clean_text(Some(description));
        }
        if let Some(label) = patch.label.as_deref() {
            entry.label = clean_text(Some(label));
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }

        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE ledger_entries
            SET entry_date = ?, category = ?, amount_cents = ?, description = ?, label = ?, status = ?
            WHERE id = ?
            "#,
            params![
                entry.entry_date.to_string(),
                entry.category.as_str(),
                money::to_cents(entry.amount)?,
                entry.description,
                entry.label,
                entry.status.as_str(),
                id,
            ],
        )?;
        drop(conn);
        if changed == 0 {
            return Err(Error::NotFound(format!("Ledger entry {}", id)));
        }

        debug!(id, "Updated ledger entry");
        self.record_activity(
            &actor.id,
            "ledger.update",
            "ledger",
            id,
            &format!("Updated entry #{}", id),
        );

        self.require_entry(id)
    }

    /// Permanently delete an entry (creator or admin)
    pub fn delete_entry(&self, actor: &Actor, id: i64) -> Result<()> {
        let entry = self.require_entry(id)?;
        if !actor.can_modify(&entry) {
            return Err(Error::PermissionDenied(format!(
                "{} may not delete ledger entry {}",
                actor.id, id
            )));
        }

        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM ledger_entries WHERE id = ?", params![id])?;
        drop(conn);
        if changed == 0 {
            return Err(Error::NotFound(format!("Ledger entry {}", id)));
        }

        info!(id, "Deleted ledger entry");
        self.record_activity(
            &actor.id,
            "ledger.delete",
            "ledger",
            id,
            &format!(
                "Deleted entry #{}: {} ${} on {}",
                id, entry.category, entry.amount, entry.entry_date
            ),
        );
        Ok(())
    }

    /// Daily summary computed in SQL over approved entries
    ///
    /// Produces the same rows, ordering and totals as [`crate::summary::aggregate`].
    pub fn daily_summary(
        &self,
        range: &DateRange,
        formula: &NetProfitFormula,
    ) -> Result<DailySummary> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entry_date,
                   created_by,
                   COALESCE(label, '') AS label_key,
                   SUM(CASE WHEN category = 'sales' THEN amount_cents ELSE 0 END),
                   SUM(CASE WHEN category = 'expense' THEN amount_cents ELSE 0 END),
                   SUM(CASE WHEN category = 'reimbursement' THEN amount_cents ELSE 0 END),
                   SUM(CASE WHEN category = 'ministry_fund' THEN amount_cents ELSE 0 END),
                   SUM(CASE WHEN category = 'offering' THEN amount_cents ELSE 0 END)
            FROM ledger_entries
            WHERE status = 'approved'
              AND (?1 IS NULL OR entry_date >= ?1)
              AND (?2 IS NULL OR entry_date <= ?2)
            GROUP BY entry_date, created_by, label_key
            ORDER BY entry_date ASC, created_by ASC, label_key ASC
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![
                    range.start.map(|d| d.to_string()),
                    range.end.map(|d| d.to_string())
                ],
                |row| {
                    let date: String = row.get(0)?;
                    let mut totals = CategoryTotals::default();
                    for (offset, category) in Category::ALL.iter().enumerate() {
                        let cents: i64 = row.get(3 + offset)?;
                        totals.add(*category, money::from_cents(cents));
                    }
                    Ok(DailySummaryRow {
                        key: SummaryKey {
                            entry_date: parse_date(0, &date)?,
                            created_by: row.get(1)?,
                            label: row.get(2)?,
                        },
                        totals,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let rows = rows
            .into_iter()
            .map(|row| DailySummaryRow {
                totals: row.totals.finish(formula),
                ..row
            })
            .collect();

        Ok(DailySummary::from_rows(rows))
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
        let date: String = row.get(1)?;
        let category: String = row.get(2)?;
        let cents: i64 = row.get(3)?;
        let status: String = row.get(8)?;
        let created_at: String = row.get(9)?;

        Ok(LedgerEntry {
            id: row.get(0)?,
            entry_date: parse_date(1, &date)?,
            category: parse_enum(2, &category)?,
            amount: money::from_cents(cents),
            description: row.get(4)?,
            label: row.get(5)?,
            receipt_id: row.get(6)?,
            created_by: row.get(7)?,
            status: parse_enum(8, &status)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
