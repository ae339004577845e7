//! Receipt operations

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{now_timestamp, parse_date, parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{
    Actor, ConfirmedFields, ExtractedFields, NewReceipt, Receipt, ReceiptPatch, ReceiptStatus,
};
use crate::money;

const RECEIPT_COLUMNS: &str = "id, uploaded_by, image_path, content_hash, status, \
     merchant_name, transaction_date, total_cents, category_suggestion, \
     confirmed_merchant, confirmed_date, confirmed_cents, confirmed_category, \
     ocr_raw, ledger_entry_id, created_at";

impl Database {
    /// Create a receipt record for an uploaded image
    pub fn create_receipt(&self, actor: &Actor, receipt: &NewReceipt) -> Result<Receipt> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (uploaded_by, image_path, content_hash, status, created_at)
             VALUES (?, ?, ?, 'pending', ?)",
            params![
                actor.id,
                receipt.image_path,
                receipt.content_hash,
                now_timestamp()
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        info!(id, image = %receipt.image_path, "Created receipt");
        self.record_activity(
            &actor.id,
            "receipt.upload",
            "receipt",
            id,
            &format!("Uploaded receipt #{}", id),
        );

        self.require_receipt(id)
    }

    /// Get receipt by ID
    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS);
        let receipt = conn
            .query_row(&sql, params![id], Self::row_to_receipt)
            .optional()?;
        Ok(receipt)
    }

    fn require_receipt(&self, id: i64) -> Result<Receipt> {
        self.get_receipt(id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {}", id)))
    }

    /// Get a receipt the actor is allowed to see (uploader or admin)
    pub fn get_receipt_for(&self, actor: &Actor, id: i64) -> Result<Receipt> {
        let receipt = self.require_receipt(id)?;
        if !actor.is_admin() && receipt.uploaded_by != actor.id {
            return Err(Error::PermissionDenied(format!(
                "{} may not access receipt {}",
                actor.id, id
            )));
        }
        Ok(receipt)
    }

    /// Apply a partial update (uploader or admin)
    pub fn update_receipt(&self, actor: &Actor, id: i64, patch: &ReceiptPatch) -> Result<Receipt> {
        let mut receipt = self.get_receipt_for(actor, id)?;

        if let Some(status) = patch.status {
            receipt.status = status;
        }
        if let Some(extracted) = &patch.extracted {
            receipt.extracted = extracted.clone();
        }
        if let Some(raw) = &patch.ocr_raw {
            receipt.ocr_raw = Some(raw.clone());
        }
        if let Some(confirmed) = &patch.confirmed {
            receipt.confirmed = Some(confirmed.clone());
        }
        if let Some(entry_id) = patch.ledger_entry_id {
            receipt.ledger_entry_id = Some(entry_id);
        }

        let extracted_cents = receipt
            .extracted
            .total_amount
            .map(money::to_cents)
            .transpose()?;
        let confirmed_cents = receipt
            .confirmed
            .as_ref()
            .map(|c| money::to_cents(c.total_amount))
            .transpose()?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE receipts SET
                status = ?,
                merchant_name = ?, transaction_date = ?, total_cents = ?, category_suggestion = ?,
                confirmed_merchant = ?, confirmed_date = ?, confirmed_cents = ?, confirmed_category = ?,
                ocr_raw = ?, ledger_entry_id = ?
            WHERE id = ?
            "#,
            params![
                receipt.status.as_str(),
                receipt.extracted.merchant_name,
                receipt.extracted.transaction_date.map(|d| d.to_string()),
                extracted_cents,
                receipt.extracted.category_suggestion,
                receipt.confirmed.as_ref().map(|c| c.merchant_name.clone()),
                receipt.confirmed.as_ref().map(|c| c.transaction_date.to_string()),
                confirmed_cents,
                receipt.confirmed.as_ref().map(|c| c.category.as_str()),
                receipt.ocr_raw,
                receipt.ledger_entry_id,
                id,
            ],
        )?;
        drop(conn);

        self.record_activity(
            &actor.id,
            "receipt.update",
            "receipt",
            id,
            &format!("Updated receipt #{} ({})", id, receipt.status.as_str()),
        );

        self.require_receipt(id)
    }

    /// List receipts visible to the actor, newest first
    ///
    /// Admins see every receipt; everyone else sees only their own uploads.
    pub fn list_receipts(&self, actor: &Actor) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM receipts WHERE (?1 OR uploaded_by = ?2)
             ORDER BY created_at DESC, id DESC",
            RECEIPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let receipts = stmt
            .query_map(params![actor.is_admin(), actor.id], Self::row_to_receipt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    /// Case-insensitive substring search over merchant names and raw extraction text
    ///
    /// An empty query matches nothing.
    pub fn search_receipts(&self, actor: &Actor, text: &str) -> Result<Vec<Receipt>> {
        let needle = text.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM receipts
            WHERE (?1 OR uploaded_by = ?2)
              AND (instr(lower(COALESCE(merchant_name, '')), lower(?3)) > 0
                OR instr(lower(COALESCE(confirmed_merchant, '')), lower(?3)) > 0
                OR instr(lower(COALESCE(ocr_raw, '')), lower(?3)) > 0)
            ORDER BY created_at DESC, id DESC
            "#,
            RECEIPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let receipts = stmt
            .query_map(
                params![actor.is_admin(), actor.id, needle],
                Self::row_to_receipt,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    /// Find an earlier upload of the same image
    pub fn get_receipt_by_hash(&self, content_hash: &str) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM receipts WHERE content_hash = ? ORDER BY id ASC LIMIT 1",
            RECEIPT_COLUMNS
        );
        let receipt = conn
            .query_row(&sql, params![content_hash], Self::row_to_receipt)
            .optional()?;
        Ok(receipt)
    }

    fn row_to_receipt(row: &Row) -> rusqlite::Result<Receipt> {
        let status: String = row.get(4)?;
        let transaction_date: Option<String> = row.get(6)?;
        let total_cents: Option<i64> = row.get(7)?;
        let confirmed_merchant: Option<String> = row.get(9)?;
        let confirmed_date: Option<String> = row.get(10)?;
        let confirmed_cents: Option<i64> = row.get(11)?;
        let confirmed_category: Option<String> = row.get(12)?;
        let created_at: String = row.get(15)?;

        let confirmed = match (
            confirmed_merchant,
            confirmed_date,
            confirmed_cents,
            confirmed_category,
        ) {
            (Some(merchant_name), Some(date), Some(cents), Some(category)) => {
                Some(ConfirmedFields {
                    merchant_name,
                    transaction_date: parse_date(10, &date)?,
                    total_amount: money::from_cents(cents),
                    category: parse_enum(12, &category)?,
                })
            }
            _ => None,
        };

        Ok(Receipt {
            id: row.get(0)?,
            uploaded_by: row.get(1)?,
            image_path: row.get(2)?,
            content_hash: row.get(3)?,
            status: parse_enum::<ReceiptStatus>(4, &status)?,
            extracted: ExtractedFields {
                merchant_name: row.get(5)?,
                transaction_date: transaction_date
                    .as_deref()
                    .map(|d| parse_date(6, d))
                    .transpose()?,
                total_amount: total_cents.map(money::from_cents),
                category_suggestion: row.get(8)?,
            },
            confirmed,
            ocr_raw: row.get(13)?,
            ledger_entry_id: row.get(14)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
