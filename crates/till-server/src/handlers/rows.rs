//! Summary row reconciliation handlers
//!
//! Rows are addressed by their key (date, creator, label) as last shown to the
//! client. A row that no longer matches any entry answers 409 so the client
//! refreshes its summary.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::handlers::read_json;
use crate::{get_actor, AppError, AppState};
use till_core::models::{EntryPatch, LedgerEntry};
use till_core::reconcile::{self, BulkDeleteReport, DeletePolicy, Resolution, TieBreak};
use till_core::summary::SummaryKey;

/// Request body for resolving a row
#[derive(Debug, Deserialize)]
pub struct ResolveRowRequest {
    pub key: SummaryKey,
}

/// Request body for editing the entry behind a row
#[derive(Debug, Deserialize)]
pub struct EditRowRequest {
    pub key: SummaryKey,
    pub patch: EntryPatch,
    /// Overrides the server's configured tie-break
    #[serde(default)]
    pub tie_break: Option<TieBreak>,
}

/// Request body for deleting every entry behind a row
#[derive(Debug, Deserialize)]
pub struct DeleteRowRequest {
    pub key: SummaryKey,
    /// Overrides the server's configured delete policy
    #[serde(default)]
    pub policy: Option<DeletePolicy>,
}

/// POST /api/summary/rows/resolve - Find the entries behind a row
pub async fn resolve_row(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Resolution>, AppError> {
    let req: ResolveRowRequest = read_json(request).await?;
    let resolution = reconcile::resolve_row(&state.db, &req.key)?;
    Ok(Json(resolution))
}

/// POST /api/summary/rows/edit - Edit the single entry behind a row
pub async fn edit_row(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<LedgerEntry>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let req: EditRowRequest = read_json(request).await?;
    if req.patch.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let tie_break = req.tie_break.unwrap_or(state.config.tie_break);
    let entry = reconcile::edit_row(&state.db, &actor, &req.key, &req.patch, tie_break)?;
    Ok(Json(entry))
}

/// POST /api/summary/rows/delete - Delete every entry behind a row
///
/// Answers 200 when every member was deleted and 207 with the per-member report
/// otherwise.
pub async fn delete_row(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<(StatusCode, Json<BulkDeleteReport>), AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let req: DeleteRowRequest = read_json(request).await?;

    let policy = req.policy.unwrap_or(state.config.delete_policy);
    let report = reconcile::delete_row(&state.db, &actor, &req.key, policy)?;

    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        info!(
            user = %actor.id,
            failed = report.failed.len(),
            "Summary row delete did not complete"
        );
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}
