//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod activity;
pub mod inventory;
pub mod ledger;
pub mod receipts;
pub mod reimbursements;
pub mod rows;

// Re-export all handlers for use in router
pub use activity::*;
pub use inventory::*;
pub use ledger::*;
pub use receipts::*;
pub use reimbursements::*;
pub use rows::*;

use axum::extract::Request;
use serde::de::DeserializeOwned;

use crate::AppError;

/// Body limit for JSON requests
const JSON_BODY_LIMIT: usize = 64 * 1024;

/// Read and parse a JSON request body
pub(crate) async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), JSON_BODY_LIMIT)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}
