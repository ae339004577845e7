//! Reimbursement workflow
//!
//! A request creates a `pending` reimbursement-category ledger entry together with
//! the reimbursement record. An admin decision settles both; approved and rejected
//! are terminal.

use chrono::{Local, NaiveDate};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::ledger::clean_text;
use super::{now_timestamp, parse_date, parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{
    Actor, Category, EntryStatus, NewReimbursement, Reimbursement, ReimbursementStatus,
};
use crate::money;

const REIMBURSEMENT_COLUMNS: &str =
    "id, ledger_entry_id, requested_by, approved_by, status, notes, payout_date, created_at";

fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "Admin access required to {}",
            action
        )))
    }
}

impl Database {
    /// Request a reimbursement for the acting user
    pub fn request_reimbursement(
        &self,
        actor: &Actor,
        request: &NewReimbursement,
    ) -> Result<Reimbursement> {
        let amount = money::require_positive(request.amount)?;
        let entry_date = request
            .entry_date
            .unwrap_or_else(|| Local::now().date_naive());
        let created_at = now_timestamp();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO ledger_entries
                (entry_date, category, amount_cents, description, label, receipt_id, created_by, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry_date.to_string(),
                Category::Reimbursement.as_str(),
                money::to_cents(amount)?,
                clean_text(request.description.as_deref()),
                clean_text(request.label.as_deref()),
                request.receipt_id,
                actor.id,
                EntryStatus::Pending.as_str(),
                created_at,
            ],
        )?;
        let entry_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO reimbursements (ledger_entry_id, requested_by, status, notes, created_at)
             VALUES (?, ?, 'pending', ?, ?)",
            params![
                entry_id,
                actor.id,
                clean_text(request.notes.as_deref()),
                created_at
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        drop(conn);

        info!(id, entry_id, %amount, "Requested reimbursement");
        self.record_activity(
            &actor.id,
            "reimbursement.create",
            "reimbursement",
            id,
            &format!("Requested reimbursement #{} (${})", id, amount),
        );

        self.require_reimbursement(id)
    }

    /// Get a reimbursement with its ledger entry
    pub fn get_reimbursement(&self, id: i64) -> Result<Option<Reimbursement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM reimbursements WHERE id = ?",
            REIMBURSEMENT_COLUMNS
        );
        let reimbursement = conn
            .query_row(&sql, params![id], Self::row_to_reimbursement)
            .optional()?;
        drop(conn);

        reimbursement.map(|r| self.with_entry(r)).transpose()
    }

    fn require_reimbursement(&self, id: i64) -> Result<Reimbursement> {
        self.get_reimbursement(id)?
            .ok_or_else(|| Error::NotFound(format!("Reimbursement {}", id)))
    }

    /// Approve a pending reimbursement (admin only); payout date is `today`
    pub fn approve_reimbursement(
        &self,
        actor: &Actor,
        id: i64,
        today: NaiveDate,
    ) -> Result<Reimbursement> {
        self.decide_reimbursement(actor, id, ReimbursementStatus::Approved, Some(today))
    }

    /// Reject a pending reimbursement (admin only)
    pub fn reject_reimbursement(&self, actor: &Actor, id: i64) -> Result<Reimbursement> {
        self.decide_reimbursement(actor, id, ReimbursementStatus::Rejected, None)
    }

    fn decide_reimbursement(
        &self,
        actor: &Actor,
        id: i64,
        decision: ReimbursementStatus,
        payout_date: Option<NaiveDate>,
    ) -> Result<Reimbursement> {
        require_admin(actor, "decide reimbursements")?;
        let current = self.require_reimbursement(id)?;
        if current.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "Reimbursement {} is already {}",
                id,
                current.status.as_str()
            )));
        }

        let entry_status = match decision {
            ReimbursementStatus::Approved => EntryStatus::Approved,
            _ => EntryStatus::Rejected,
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE reimbursements SET status = ?, approved_by = ?, payout_date = ?
             WHERE id = ? AND status = 'pending'",
            params![
                decision.as_str(),
                actor.id,
                payout_date.map(|d| d.to_string()),
                id
            ],
        )?;
        if changed == 0 {
            return Err(Error::InvalidData(format!(
                "Reimbursement {} was decided concurrently",
                id
            )));
        }
        tx.execute(
            "UPDATE ledger_entries SET status = ? WHERE id = ?",
            params![entry_status.as_str(), current.ledger_entry_id],
        )?;
        tx.commit()?;
        drop(conn);

        let action = match decision {
            ReimbursementStatus::Approved => "reimbursement.approve",
            _ => "reimbursement.reject",
        };
        info!(id, decision = decision.as_str(), "Decided reimbursement");
        self.record_activity(
            &actor.id,
            action,
            "reimbursement",
            id,
            &format!(
                "{} reimbursement #{} (requested by {})",
                if decision == ReimbursementStatus::Approved {
                    "Approved"
                } else {
                    "Rejected"
                },
                id,
                current.requested_by
            ),
        );

        self.require_reimbursement(id)
    }

    /// Reimbursements requested by the actor, newest first
    pub fn list_my_reimbursements(&self, actor: &Actor) -> Result<Vec<Reimbursement>> {
        self.query_reimbursements(
            "WHERE requested_by = ?1 ORDER BY created_at DESC, id DESC",
            &actor.id,
        )
    }

    /// Pending reimbursements, oldest first (admin only)
    pub fn list_pending_reimbursements(&self, actor: &Actor) -> Result<Vec<Reimbursement>> {
        require_admin(actor, "list pending reimbursements")?;
        self.query_reimbursements(
            "WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            ReimbursementStatus::Pending.as_str(),
        )
    }

    fn query_reimbursements(&self, clause: &str, param: &str) -> Result<Vec<Reimbursement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM reimbursements {}",
            REIMBURSEMENT_COLUMNS, clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![param], Self::row_to_reimbursement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        items.into_iter().map(|r| self.with_entry(r)).collect()
    }

    fn with_entry(&self, mut reimbursement: Reimbursement) -> Result<Reimbursement> {
        reimbursement.ledger_entry = self.get_entry(reimbursement.ledger_entry_id)?;
        Ok(reimbursement)
    }

    fn row_to_reimbursement(row: &Row) -> rusqlite::Result<Reimbursement> {
        let status: String = row.get(4)?;
        let payout_date: Option<String> = row.get(6)?;
        let created_at: String = row.get(7)?;

        Ok(Reimbursement {
            id: row.get(0)?,
            ledger_entry_id: row.get(1)?,
            requested_by: row.get(2)?,
            approved_by: row.get(3)?,
            status: parse_enum(4, &status)?,
            notes: row.get(5)?,
            payout_date: payout_date.as_deref().map(|d| parse_date(6, d)).transpose()?,
            created_at: parse_datetime(&created_at),
            ledger_entry: None,
        })
    }
}
