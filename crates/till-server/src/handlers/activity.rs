//! Activity log handler

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};

use crate::{get_actor, AppError, AppState};
use till_core::models::{ActivityEntry, ActivityFilter};

/// GET /api/activity - Recent activity, newest first (admin)
///
/// Optional filters: `?actor=`, `?entity_type=`, `?limit=`.
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ActivityFilter>,
    request: Request,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    if !actor.is_admin() {
        return Err(AppError::forbidden("Admin access required to view activity"));
    }

    Ok(Json(state.db.list_activity(&filter)?))
}
