//! Reimbursement request and approval handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use chrono::Local;

use crate::handlers::read_json;
use crate::{get_actor, AppError, AppState};
use till_core::models::{NewReimbursement, Reimbursement};

/// GET /api/reimbursements - Reimbursements requested by the acting user
pub async fn list_my_reimbursements(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Reimbursement>>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    Ok(Json(state.db.list_my_reimbursements(&actor)?))
}

/// GET /api/reimbursements/pending - Pending requests awaiting a decision (admin)
pub async fn list_pending_reimbursements(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Reimbursement>>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    Ok(Json(state.db.list_pending_reimbursements(&actor)?))
}

/// POST /api/reimbursements - Request a reimbursement
pub async fn request_reimbursement(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Reimbursement>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let req: NewReimbursement = read_json(request).await?;
    Ok(Json(state.db.request_reimbursement(&actor, &req)?))
}

/// POST /api/reimbursements/:id/approve - Approve with today's payout date (admin)
pub async fn approve_reimbursement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Reimbursement>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let today = Local::now().date_naive();
    Ok(Json(state.db.approve_reimbursement(&actor, id, today)?))
}

/// POST /api/reimbursements/:id/reject - Reject a pending request (admin)
pub async fn reject_reimbursement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Reimbursement>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    Ok(Json(state.db.reject_reimbursement(&actor, id)?))
}
