//! Test utilities for till-core
//!
//! A mock OpenAI-compatible vision server for extractor integration tests and
//! local development without a real model.

use axum::{extract::Json, http::StatusCode, routing::post, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Receipt JSON returned by the mock server for any image
pub const MOCK_RECEIPT_JSON: &str = r#"{
    "merchant_name": "Acme",
    "transaction_date": "2024-03-03",
    "total_amount": 12.5,
    "subtotal": 11.5,
    "tax": 1.0,
    "items": [
        {"name": "Paper towels", "quantity": 2, "price": 4.5},
        {"name": "Coffee", "quantity": null, "price": 2.5}
    ],
    "payment_method": "card",
    "category_suggestion": "expense"
}"#;

/// What the mock server answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockVisionMode {
    /// Receipt JSON wrapped in a Markdown fence
    Receipt,
    /// Prose with no JSON
    Unreadable,
    /// HTTP 500
    ServerError,
}

/// Mock vision server for testing and development
pub struct MockVisionServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockVisionServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(MockVisionMode::Receipt).await
    }

    pub async fn start_with(mode: MockVisionMode) -> Self {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(request): Json<ChatRequest>| handle_completion(mode, request)),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockVisionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_completion(
    mode: MockVisionMode,
    request: ChatRequest,
) -> Result<Json<ChatResponse>, StatusCode> {
    // requests without an image part are malformed for this endpoint
    let has_image = request.messages.iter().any(|m| {
        m.content
            .as_array()
            .map(|parts| parts.iter().any(|p| p["type"] == "image_url"))
            .unwrap_or(false)
    });
    if !has_image {
        return Err(StatusCode::BAD_REQUEST);
    }

    let content = match mode {
        MockVisionMode::Receipt => format!("```json\n{}\n```", MOCK_RECEIPT_JSON),
        MockVisionMode::Unreadable => "I cannot read this receipt.".to_string(),
        MockVisionMode::ServerError => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    Ok(Json(ChatResponse {
        model: request.model,
        choices: vec![Choice {
            message: Message {
                role: "assistant".to_string(),
                content,
            },
        }],
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Deserialize)]
struct RequestMessage {
    content: Value,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}
