//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use till_core::models::{Category, EntryPatch, EntryStatus};
use till_core::summary::SummaryKey;

/// Till - Daily ledger, receipts, and reconciliation
#[derive(Parser)]
#[command(name = "till")]
#[command(about = "Operations console for a small shop's daily ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "till.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TILL_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Identity recorded as the creator/actor of every change
    #[arg(long = "as", env = "TILL_USER", default_value = "local", global = true)]
    pub as_user: String,

    /// Act with the admin role (approvals, status changes, other users' entries)
    #[arg(long, global = true)]
    pub admin: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an X-Till-User header or an API key.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Manage ledger entries
    Ledger {
        #[command(subcommand)]
        action: Option<LedgerAction>,
    },

    /// Show the daily summary for a date range
    Summary {
        /// First day (inclusive)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day (inclusive)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Edit or delete the entries behind a summary row
    Row {
        #[command(subcommand)]
        action: RowAction,
    },

    /// Receipt ingestion (upload, review, confirm)
    Receipts {
        #[command(subcommand)]
        action: Option<ReceiptsAction>,
    },

    /// Reimbursement requests and approvals
    Reimbursements {
        #[command(subcommand)]
        action: Option<ReimbursementsAction>,
    },

    /// Manage counted inventory
    Inventory {
        #[command(subcommand)]
        action: Option<InventoryAction>,
    },

    /// Show the activity log (admin)
    Activity {
        /// Only show activity by this user
        #[arg(long)]
        actor: Option<String>,

        /// Only show activity on this entity type (ledger, receipt, reimbursement, inventory)
        #[arg(long)]
        entity_type: Option<String>,

        /// Maximum entries to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

/// Fields to change on a ledger entry
#[derive(Args, Debug, Default)]
pub struct PatchArgs {
    /// New amount
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// New category
    #[arg(long)]
    pub category: Option<Category>,

    /// New entry date
    #[arg(long)]
    pub set_date: Option<NaiveDate>,

    /// New description (empty clears it)
    #[arg(long)]
    pub description: Option<String>,

    /// New label (empty clears it)
    #[arg(long)]
    pub set_label: Option<String>,

    /// New status (admin only)
    #[arg(long)]
    pub status: Option<EntryStatus>,
}

impl PatchArgs {
    pub fn into_patch(self) -> EntryPatch {
        EntryPatch {
            entry_date: self.set_date,
            category: self.category,
            amount: self.amount,
            description: self.description,
            label: self.set_label,
            status: self.status,
        }
    }
}

/// A summary row as shown by `till summary`
#[derive(Args, Debug)]
pub struct RowKeyArgs {
    /// Row date
    #[arg(long)]
    pub date: NaiveDate,

    /// Row creator
    #[arg(long)]
    pub user: String,

    /// Row label (omit for unlabelled rows)
    #[arg(long, default_value = "")]
    pub label: String,
}

impl RowKeyArgs {
    pub fn key(&self) -> SummaryKey {
        SummaryKey::new(self.date, self.user.as_str(), Some(self.label.as_str()))
    }
}

#[derive(Subcommand)]
pub enum LedgerAction {
    /// List entries (default: all)
    List {
        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Record a new entry
    Add {
        /// Category: sales, expense, reimbursement, ministry_fund, offering
        #[arg(short, long)]
        category: Category,

        /// Amount (positive)
        #[arg(short, long)]
        amount: Decimal,

        /// Entry date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        description: Option<String>,

        /// Grouping label such as a shift or event
        #[arg(long)]
        label: Option<String>,
    },

    /// Update an entry
    Edit {
        /// Entry ID
        id: i64,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// Delete an entry
    Delete {
        /// Entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RowAction {
    /// Show the entries behind a row
    Resolve {
        #[command(flatten)]
        key: RowKeyArgs,
    },

    /// Edit the single entry behind a row
    Edit {
        #[command(flatten)]
        key: RowKeyArgs,

        #[command(flatten)]
        patch: PatchArgs,

        /// When several entries match, edit the earliest created instead of failing
        #[arg(long)]
        earliest: bool,
    },

    /// Delete every entry behind a row
    Delete {
        #[command(flatten)]
        key: RowKeyArgs,

        /// Keep going after a member fails to delete
        #[arg(long)]
        continue_on_failure: bool,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// List receipts you can see
    List,

    /// Search merchant names and extracted text
    Search {
        /// Text to search for
        query: String,
    },

    /// Upload a receipt image and extract its fields
    Upload {
        /// Image file (png, jpg, jpeg, webp)
        file: PathBuf,
    },

    /// Confirm a pending receipt into a ledger entry
    ///
    /// Unset fields keep the extracted values.
    Confirm {
        /// Receipt ID
        id: i64,

        #[arg(long)]
        merchant: Option<String>,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        amount: Option<Decimal>,

        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        label: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReimbursementsAction {
    /// List your reimbursement requests
    List,

    /// List requests awaiting a decision (admin)
    Pending,

    /// Request a reimbursement
    Request {
        /// Amount (positive)
        #[arg(short, long)]
        amount: Decimal,

        /// Date of the expense (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Approve a pending request (admin)
    Approve {
        /// Reimbursement ID
        id: i64,
    },

    /// Reject a pending request (admin)
    Reject {
        /// Reimbursement ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum InventoryAction {
    /// List items
    List,

    /// Add an item
    Add {
        /// Item name
        name: String,

        #[arg(short, long, default_value = "0")]
        quantity: Decimal,

        #[arg(long)]
        unit: Option<String>,
    },

    /// Set an item's quantity
    Set {
        /// Item ID
        id: i64,

        /// New quantity
        quantity: Decimal,
    },

    /// Remove an item
    Remove {
        /// Item ID
        id: i64,
    },
}
