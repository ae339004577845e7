//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db)
//! - `ledger` - Ledger entry and daily summary commands
//! - `rows` - Summary row resolve/edit/delete
//! - `receipts` - Receipt upload, review and confirm
//! - `reimbursements` - Reimbursement requests and approvals
//! - `inventory` - Inventory commands
//! - `activity` - Activity log
//! - `serve` - Web server command

pub mod activity;
pub mod core;
pub mod inventory;
pub mod ledger;
pub mod receipts;
pub mod reimbursements;
pub mod rows;
pub mod serve;

// Re-export command functions for main.rs
pub use activity::*;
pub use core::*;
pub use inventory::*;
pub use ledger::*;
pub use receipts::*;
pub use reimbursements::*;
pub use rows::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
