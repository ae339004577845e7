//! Till Core Library
//!
//! Shared functionality for the Till operations console:
//! - Database access and migrations (ledger, receipts, reimbursements, inventory, activity)
//! - Daily summary aggregation with a configurable net-profit formula
//! - Reconciliation of summary rows back to their ledger entries
//! - Receipt-to-ledger ingestion with human review
//! - Pluggable receipt extractors (OpenAI-compatible vision, mock)

pub mod ai;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod money;
pub mod reconcile;
pub mod store;
pub mod summary;

/// Test utilities including a mock vision server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{ExtractedReceipt, ExtractorClient, MockExtractor, OpenAICompatibleBackend, ReceiptExtractor};
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{DirImageStore, ImageStore, IngestError, IngestState, Ingestion, ReviewForm};
pub use reconcile::{BulkDeleteReport, DeletePolicy, ReconcileError, Resolution, TieBreak};
pub use store::{InventorySink, LedgerStore, ReceiptStore};
pub use summary::{CategoryTotals, DailySummary, DailySummaryRow, NetProfitFormula, SummaryKey};
