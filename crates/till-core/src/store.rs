//! Store boundaries used by the reconciliation and ingestion engines
//!
//! `Database` implements all three; tests substitute failing or recording stores.

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    Actor, DateRange, EntryPatch, LedgerEntry, NewLedgerEntry, NewReceipt, Receipt, ReceiptLineItem,
    ReceiptPatch,
};
use crate::summary::{DailySummary, NetProfitFormula};

/// Persistence for individual ledger entries
pub trait LedgerStore: Send + Sync {
    fn create_entry(&self, actor: &Actor, entry: &NewLedgerEntry) -> Result<LedgerEntry>;

    fn list_entries(&self, range: &DateRange) -> Result<Vec<LedgerEntry>>;

    fn update_entry(&self, actor: &Actor, id: i64, patch: &EntryPatch) -> Result<LedgerEntry>;

    fn delete_entry(&self, actor: &Actor, id: i64) -> Result<()>;

    /// Server-side mirror of [`crate::summary::aggregate`]
    fn daily_summary(&self, range: &DateRange, formula: &NetProfitFormula)
        -> Result<DailySummary>;
}

/// Persistence for uploaded receipts
pub trait ReceiptStore: Send + Sync {
    fn create_receipt(&self, actor: &Actor, receipt: &NewReceipt) -> Result<Receipt>;

    fn update_receipt(&self, actor: &Actor, id: i64, patch: &ReceiptPatch) -> Result<Receipt>;

    fn list_receipts(&self, actor: &Actor) -> Result<Vec<Receipt>>;

    fn search_receipts(&self, actor: &Actor, text: &str) -> Result<Vec<Receipt>>;
}

/// Downstream consumer of receipt line items
pub trait InventorySink: Send + Sync {
    /// Returns how many items were applied
    fn add_items(&self, actor: &Actor, items: &[ReceiptLineItem]) -> Result<usize>;
}

impl LedgerStore for Database {
    fn create_entry(&self, actor: &Actor, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        Database::create_entry(self, actor, entry)
    }

    fn list_entries(&self, range: &DateRange) -> Result<Vec<LedgerEntry>> {
        Database::list_entries(self, range)
    }

    fn update_entry(&self, actor: &Actor, id: i64, patch: &EntryPatch) -> Result<LedgerEntry> {
        Database::update_entry(self, actor, id, patch)
    }

    fn delete_entry(&self, actor: &Actor, id: i64) -> Result<()> {
        Database::delete_entry(self, actor, id)
    }

    fn daily_summary(
        &self,
        range: &DateRange,
        formula: &NetProfitFormula,
    ) -> Result<DailySummary> {
        Database::daily_summary(self, range, formula)
    }
}

impl ReceiptStore for Database {
    fn create_receipt(&self, actor: &Actor, receipt: &NewReceipt) -> Result<Receipt> {
        Database::create_receipt(self, actor, receipt)
    }

    fn update_receipt(&self, actor: &Actor, id: i64, patch: &ReceiptPatch) -> Result<Receipt> {
        Database::update_receipt(self, actor, id, patch)
    }

    fn list_receipts(&self, actor: &Actor) -> Result<Vec<Receipt>> {
        Database::list_receipts(self, actor)
    }

    fn search_receipts(&self, actor: &Actor, text: &str) -> Result<Vec<Receipt>> {
        Database::search_receipts(self, actor, text)
    }
}

impl InventorySink for Database {
    fn add_items(&self, actor: &Actor, items: &[ReceiptLineItem]) -> Result<usize> {
        self.add_receipt_items(actor, items)
    }
}
