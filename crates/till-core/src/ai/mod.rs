//! Pluggable receipt extractor abstraction
//!
//! The extractor is an opaque, unreliable collaborator: it returns best-effort
//! fields from a receipt image or an error. Nothing it returns reaches the ledger
//! without human review (see [`crate::ingest`]).
//!
//! # Architecture
//!
//! - `ReceiptExtractor` trait: the single extraction operation
//! - `ExtractorClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backends: `OpenAICompatibleBackend`, `MockExtractor`
//!
//! # Configuration
//!
//! Environment variables:
//! - `EXTRACTOR_BACKEND`: Backend to use (openai_compatible, mock). Default: openai_compatible
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible)
//! - `OPENAI_COMPATIBLE_MODEL`: Vision model (default: gpt-4o)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::{MockBehavior, MockExtractor};
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::{ExtractedItem, ExtractedReceipt};

use async_trait::async_trait;

use crate::error::Result;

/// Environment variable selecting the extractor backend
pub const EXTRACTOR_BACKEND_ENV: &str = "EXTRACTOR_BACKEND";

/// Trait implemented by every receipt extractor
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Extract structured fields from image bytes
    ///
    /// `Err` means the extraction failed outright; an `Ok` value may still hold
    /// no usable field.
    async fn extract(&self, image: &[u8], mime: &str) -> Result<ExtractedReceipt>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete extractor enum
#[derive(Clone)]
pub enum ExtractorClient {
    /// OpenAI-compatible vision API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock extractor for testing
    Mock(MockExtractor),
}

impl ExtractorClient {
    /// Create an extractor from environment variables
    ///
    /// Returns None if the selected backend is not configured.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var(EXTRACTOR_BACKEND_ENV)
            .unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" => {
                OpenAICompatibleBackend::from_env().map(ExtractorClient::OpenAICompatible)
            }
            "mock" => Some(ExtractorClient::Mock(MockExtractor::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown EXTRACTOR_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env().map(ExtractorClient::OpenAICompatible)
            }
        }
    }

    pub fn openai_compatible(host: &str, model: &str) -> Self {
        ExtractorClient::OpenAICompatible(OpenAICompatibleBackend::new(host, model))
    }

    pub fn mock() -> Self {
        ExtractorClient::Mock(MockExtractor::new())
    }
}

#[async_trait]
impl ReceiptExtractor for ExtractorClient {
    async fn extract(&self, image: &[u8], mime: &str) -> Result<ExtractedReceipt> {
        match self {
            ExtractorClient::OpenAICompatible(b) => b.extract(image, mime).await,
            ExtractorClient::Mock(b) => b.extract(image, mime).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ExtractorClient::OpenAICompatible(b) => b.name(),
            ExtractorClient::Mock(b) => b.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_dispatches_to_mock() {
        let client = ExtractorClient::mock();
        assert_eq!(client.name(), "mock");
        let receipt = client.extract(b"img", "image/png").await.unwrap();
        assert_eq!(receipt.merchant_name.as_deref(), Some("Corner Market"));
    }

    #[tokio::test]
    async fn test_mock_behaviors() {
        let empty = MockExtractor::empty();
        let receipt = empty.extract(b"img", "image/png").await.unwrap();
        assert!(!receipt.fields().is_usable());
        assert_eq!(empty.calls(), 1);

        let failing = MockExtractor::failing("blurry");
        assert!(failing.extract(b"img", "image/png").await.is_err());
    }
}
