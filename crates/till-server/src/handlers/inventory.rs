//! Inventory handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::handlers::read_json;
use crate::{get_actor, AppError, AppState, SuccessResponse};
use till_core::models::InventoryItem;

/// Request body for adding an item
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Request body for setting an item's quantity
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: Decimal,
}

/// GET /api/inventory - List inventory items
pub async fn list_inventory(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InventoryItem>>, AppError> {
    Ok(Json(state.db.list_inventory()?))
}

/// POST /api/inventory - Add an item
pub async fn create_inventory_item(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<InventoryItem>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let req: CreateItemRequest = read_json(request).await?;
    if req.quantity.is_sign_negative() {
        return Err(AppError::bad_request("Quantity cannot be negative"));
    }

    let item = state
        .db
        .create_inventory_item(&actor, &req.name, req.quantity, req.unit.as_deref())?;
    Ok(Json(item))
}

/// PATCH /api/inventory/:id - Set an item's quantity
pub async fn update_inventory_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<InventoryItem>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let req: UpdateQuantityRequest = read_json(request).await?;
    if req.quantity.is_sign_negative() {
        return Err(AppError::bad_request("Quantity cannot be negative"));
    }

    Ok(Json(state.db.set_inventory_quantity(&actor, id, req.quantity)?))
}

/// DELETE /api/inventory/:id - Remove an item
pub async fn delete_inventory_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    state.db.delete_inventory_item(&actor, id)?;
    Ok(Json(SuccessResponse { success: true }))
}
