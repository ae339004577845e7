//! Ledger entry and daily summary handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};

use crate::handlers::read_json;
use crate::{get_actor, AppError, AppState, SuccessResponse};
use till_core::models::{DateRange, EntryPatch, LedgerEntry, NewLedgerEntry};
use till_core::summary::DailySummary;

/// GET /api/ledger - List entries in a date range (`?start=&end=`, inclusive)
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let entries = state.db.list_entries(&range)?;
    Ok(Json(entries))
}

/// GET /api/ledger/:id - Get a single entry
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LedgerEntry>, AppError> {
    let entry = state
        .db
        .get_entry(id)?
        .ok_or_else(|| AppError::not_found(&format!("Ledger entry {} not found", id)))?;
    Ok(Json(entry))
}

/// POST /api/ledger - Record a new entry for the acting user
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<LedgerEntry>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let new_entry: NewLedgerEntry = read_json(request).await?;

    let entry = state.db.create_entry(&actor, &new_entry)?;
    Ok(Json(entry))
}

/// PATCH /api/ledger/:id - Update an entry (creator or admin)
pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<LedgerEntry>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let patch: EntryPatch = read_json(request).await?;
    if patch.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let entry = state.db.update_entry(&actor, id, &patch)?;
    Ok(Json(entry))
}

/// DELETE /api/ledger/:id - Delete an entry (creator or admin)
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    state.db.delete_entry(&actor, id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/summary - Daily summary rows plus totals for a date range
pub async fn daily_summary(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRange>,
) -> Result<Json<DailySummary>, AppError> {
    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(AppError::bad_request("start must not be after end"));
        }
    }

    let summary = state.db.daily_summary(&range, &state.config.net_profit)?;
    Ok(Json(summary))
}
