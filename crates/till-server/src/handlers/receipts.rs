//! Receipt ingestion handlers
//!
//! Upload runs extraction inline and answers with the ingestion state (`review`
//! or `done`). Review is resumed in a later request by `confirm`, which commits
//! exactly one ledger entry and links it to the receipt.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::handlers::read_json;
use crate::{get_actor, AppError, AppState, MAX_UPLOAD_SIZE};
use till_core::ingest::{content_hash, image_extension, image_mime, IngestState, Ingestion, ReviewForm};
use till_core::models::{LedgerEntry, Receipt};

/// Query parameters for upload
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original file name; its extension selects the image type
    pub filename: String,
}

/// Response for an upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub state: IngestState,
    pub receipt: Receipt,
}

/// Query parameters for search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Response for a confirmed receipt
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub state: IngestState,
    pub entry: LedgerEntry,
    pub receipt: Receipt,
}

/// GET /api/receipts - List receipts visible to the acting user
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let receipts = state.db.list_receipts(&actor)?;
    Ok(Json(receipts))
}

/// GET /api/receipts/search?q= - Search merchant names and raw extraction text
pub async fn search_receipts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
    request: Request,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let receipts = state.db.search_receipts(&actor, &query.q)?;
    Ok(Json(receipts))
}

/// GET /api/receipts/:id - Get a single receipt (uploader or admin)
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let receipt = state.db.get_receipt_for(&actor, id)?;
    Ok(Json(receipt))
}

/// GET /api/receipts/:id/image - Serve the stored receipt image
pub async fn get_receipt_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let receipt = state.db.get_receipt_for(&actor, id)?;

    let path = state.images.resolve(&receipt.image_path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::not_found("Receipt image not found"))?;
    let mime = image_extension(&receipt.image_path)
        .map(|ext| image_mime(&ext))
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}

/// POST /api/receipts?filename= - Upload a receipt image (raw body) and extract it
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    request: Request,
) -> Result<Json<UploadResponse>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let extractor = state
        .extractor
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Receipt extraction is not configured"))?;

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body or file too large (max 10MB)"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("No image data provided"));
    }

    // Reject re-uploads of the same image
    if let Some(existing) = state.db.get_receipt_by_hash(&content_hash(&bytes))? {
        return Err(AppError::conflict(&format!(
            "Receipt already exists with ID {}",
            existing.id
        )));
    }

    let mut ingest = Ingestion::new(&state.db, &state.db, &state.images, extractor, actor.clone())
        .with_inventory(&state.db);
    let ingest_state = ingest
        .upload(&query.filename, &bytes, &mut |percent: u8| {
            debug!(percent, "Receipt upload progress")
        })
        .await?
        .clone();

    let receipt_id = match &ingest_state {
        IngestState::Review { receipt_id, .. } | IngestState::Done { receipt_id, .. } => {
            *receipt_id
        }
        other => {
            return Err(AppError::internal(&format!(
                "Upload stopped in unexpected state: {}",
                other.name()
            )))
        }
    };
    let receipt = state.db.get_receipt_for(&actor, receipt_id)?;

    info!(user = %actor.id, receipt_id, state = ingest_state.name(), "Receipt uploaded");
    Ok(Json(UploadResponse {
        state: ingest_state,
        receipt,
    }))
}

/// POST /api/receipts/:id/confirm - Commit the reviewed fields to the ledger
///
/// Body is the review form. A form that fails validation answers 400 and
/// writes nothing.
pub async fn confirm_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<ConfirmResponse>, AppError> {
    let actor = get_actor(request.headers(), &state.config);
    let form: ReviewForm = read_json(request).await?;

    let receipt = state.db.get_receipt_for(&actor, id)?;
    let mut ingest = Ingestion::for_review(&state.db, &state.db, actor.clone());
    ingest.resume(&receipt)?;
    let (ingest_state, entry) = ingest.confirm(form)?;
    let ingest_state = ingest_state.clone();

    let receipt = state.db.get_receipt_for(&actor, id)?;
    Ok(Json(ConfirmResponse {
        state: ingest_state,
        entry,
        receipt,
    }))
}
