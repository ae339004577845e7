//! Till Web Server
//!
//! Axum-based REST API for the Till operations console.
//!
//! Identity and role are resolved here from request headers and passed
//! explicitly into every core operation:
//! - `X-Till-User` carries the acting user (set by the upstream auth proxy)
//! - API keys (`Authorization: Bearer <key>`) act as the `api-key` user
//! - Users listed in `TILL_ADMINS` act with the admin role

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use till_core::ai::{ExtractorClient, ReceiptExtractor};
use till_core::db::Database;
use till_core::ingest::{DirImageStore, IngestError, RECEIPTS_DIR_ENV};
use till_core::models::{Actor, Role};
use till_core::reconcile::{DeletePolicy, ReconcileError, TieBreak};
use till_core::summary::NetProfitFormula;

mod handlers;

/// Maximum receipt upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Header carrying the authenticated user identity
pub const USER_HEADER: &str = "x-till-user";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Identity used for API key requests
const API_KEY_USER: &str = "api-key";

/// Identity used when authentication is disabled and no user header is sent
const LOCAL_DEV_USER: &str = "local-dev";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys for service authentication
    pub api_keys: Vec<String>,
    /// Identities acting with the admin role
    pub admins: Vec<String>,
    /// Coefficients for the daily summary net profit
    pub net_profit: NetProfitFormula,
    /// Policy for row edits when several entries share a key
    pub tie_break: TieBreak,
    /// Policy for row deletes after a member fails
    pub delete_policy: DeletePolicy,
    /// Directory for storing receipt images
    pub receipts_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            admins: vec![],
            net_profit: NetProfitFormula::default(),
            tie_break: TieBreak::default(),
            delete_policy: DeletePolicy::default(),
            receipts_dir: PathBuf::from("receipts"),
        }
    }
}

impl ServerConfig {
    /// Read `TILL_API_KEYS`, `TILL_ADMINS`, `TILL_NET_PROFIT` and `TILL_RECEIPTS_DIR`
    pub fn from_env() -> anyhow::Result<Self> {
        let list = |name: &str| std::env::var(name).map(|v| parse_list(&v)).unwrap_or_default();

        Ok(Self {
            api_keys: list("TILL_API_KEYS"),
            admins: list("TILL_ADMINS"),
            net_profit: NetProfitFormula::from_env()?,
            receipts_dir: std::env::var(RECEIPTS_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("receipts")),
            ..Default::default()
        })
    }
}

/// Parse a comma-separated list, dropping empty items
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Receipt extractor; uploads are refused when absent
    pub extractor: Option<ExtractorClient>,
    pub images: DirImageStore,
}

/// Authentication middleware - accepts the upstream user header or an API key
///
/// **User header**: `X-Till-User` is trusted as set by the authenticating proxy in
/// front of this server. Do not expose the server directly.
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    if let Some(user) = header_user(request.headers()) {
        info!(user = %user, path = %request.uri().path(), "Authenticated via user header");
        return next.run(request).await;
    }

    let api_key_valid = bearer_token(request.headers())
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = API_KEY_USER, path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

fn header_user(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Resolve the acting identity and role for a request
pub fn get_actor(headers: &HeaderMap, config: &ServerConfig) -> Actor {
    let id = header_user(headers)
        .map(String::from)
        .or_else(|| bearer_token(headers).map(|_| API_KEY_USER.to_string()))
        .unwrap_or_else(|| LOCAL_DEV_USER.to_string());

    let role = if config.admins.iter().any(|a| a == &id) {
        Role::Admin
    } else {
        Role::Worker
    };
    Actor::new(id, role)
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
///
/// The receipt extractor is read from the environment.
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    let extractor = ExtractorClient::from_env();
    match &extractor {
        Some(client) => info!("Receipt extractor configured: {}", client.name()),
        None => info!("Receipt extractor not configured (set OPENAI_COMPATIBLE_HOST or EXTRACTOR_BACKEND=mock)"),
    }
    create_router_with_options(db, static_dir, config, extractor)
}

/// Create the application router with an explicit extractor (for testing)
pub fn create_router_with_options(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    extractor: Option<ExtractorClient>,
) -> Router {
    let state = Arc::new(AppState {
        db,
        images: DirImageStore::new(&config.receipts_dir),
        config: config.clone(),
        extractor,
    });

    let api_routes = Router::new()
        // Ledger entries
        .route(
            "/ledger",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route(
            "/ledger/:id",
            get(handlers::get_entry)
                .patch(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        // Daily summary and row reconciliation
        .route("/summary", get(handlers::daily_summary))
        .route("/summary/rows/resolve", post(handlers::resolve_row))
        .route("/summary/rows/edit", post(handlers::edit_row))
        .route("/summary/rows/delete", post(handlers::delete_row))
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::upload_receipt),
        )
        .route("/receipts/search", get(handlers::search_receipts))
        .route("/receipts/:id", get(handlers::get_receipt))
        .route("/receipts/:id/image", get(handlers::get_receipt_image))
        .route("/receipts/:id/confirm", post(handlers::confirm_receipt))
        // Reimbursements
        .route(
            "/reimbursements",
            get(handlers::list_my_reimbursements).post(handlers::request_reimbursement),
        )
        .route(
            "/reimbursements/pending",
            get(handlers::list_pending_reimbursements),
        )
        .route(
            "/reimbursements/:id/approve",
            post(handlers::approve_reimbursement),
        )
        .route(
            "/reimbursements/:id/reject",
            post(handlers::reject_reimbursement),
        )
        // Inventory
        .route(
            "/inventory",
            get(handlers::list_inventory).post(handlers::create_inventory_item),
        )
        .route(
            "/inventory/:id",
            axum::routing::patch(handlers::update_inventory_item)
                .delete(handlers::delete_inventory_item),
        )
        // Activity log
        .route("/activity", get(handlers::list_activity));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    }
    if config.admins.is_empty() {
        warn!("No admins configured (TILL_ADMINS); approvals and status changes are unavailable");
    }

    let app = create_router(db, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    /// Extra fields merged into the JSON body
    details: Option<serde_json::Value>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            details: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unavailable(msg: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Map user-facing core errors; anything else stays an internal error
    fn from_core(err: &till_core::Error) -> Option<Self> {
        use till_core::Error;

        match err {
            Error::InvalidData(msg) => Some(Self::bad_request(msg)),
            Error::NotFound(what) => Some(Self::not_found(&format!("{} not found", what))),
            Error::PermissionDenied(msg) => Some(Self::forbidden(msg)),
            _ => None,
        }
    }

    fn from_reconcile(err: &ReconcileError) -> Option<Self> {
        match err {
            ReconcileError::NoMatchingEntries(_) => Some(
                Self::conflict(&err.to_string()).with_details(serde_json::json!({ "stale": true })),
            ),
            ReconcileError::Ambiguous { candidates, .. } => Some(
                Self::conflict(&err.to_string())
                    .with_details(serde_json::json!({ "candidates": candidates })),
            ),
            ReconcileError::Store(e) => Self::from_core(e),
        }
    }

    fn from_ingest(err: &IngestError) -> Option<Self> {
        match err {
            IngestError::InvalidTransition { .. } => Some(Self::conflict(&err.to_string())),
            IngestError::Validation(msg) => Some(Self::bad_request(msg)),
            IngestError::ReviewOnly => Some(Self::unavailable(&err.to_string())),
            IngestError::Upload(e) | IngestError::Store(e) => Self::from_core(e),
            IngestError::ReceiptLinkFailed {
                receipt_id,
                entry_id,
                ..
            } => Some(
                Self::internal(&format!(
                    "Ledger entry {} was created but receipt {} could not be linked",
                    entry_id, receipt_id
                ))
                .with_details(serde_json::json!({
                    "entry_id": entry_id,
                    "receipt_id": receipt_id,
                })),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({
            "error": self.message
        });
        if let (Some(serde_json::Value::Object(extra)), Some(map)) =
            (self.details, body.as_object_mut())
        {
            map.extend(extra);
        }

        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        let mapped = if let Some(e) = err.downcast_ref::<till_core::Error>() {
            Self::from_core(e)
        } else if let Some(e) = err.downcast_ref::<ReconcileError>() {
            Self::from_reconcile(e)
        } else if let Some(e) = err.downcast_ref::<IngestError>() {
            Self::from_ingest(e)
        } else {
            None
        };

        mapped.unwrap_or_else(|| Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            details: None,
            // Keep full error for logging
            internal: Some(err),
        })
    }
}
