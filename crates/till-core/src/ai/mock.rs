//! Mock extractor for testing
//!
//! Returns a fixed receipt, an empty extraction, or a failure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

use super::types::{ExtractedItem, ExtractedReceipt};
use super::ReceiptExtractor;

/// What the mock returns from `extract`
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Receipt(ExtractedReceipt),
    /// Succeeds with nothing usable
    Empty,
    Fail(String),
}

/// Mock receipt extractor
#[derive(Debug, Clone)]
pub struct MockExtractor {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// A mock returning [`MockExtractor::sample_receipt`]
    pub fn new() -> Self {
        Self::with_receipt(Self::sample_receipt())
    }

    pub fn with_receipt(receipt: ExtractedReceipt) -> Self {
        Self {
            behavior: MockBehavior::Receipt(receipt),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self {
            behavior: MockBehavior::Empty,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            behavior: MockBehavior::Fail(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `extract` calls so far (shared across clones)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A small grocery receipt
    pub fn sample_receipt() -> ExtractedReceipt {
        ExtractedReceipt {
            merchant_name: Some("Corner Market".to_string()),
            transaction_date: Some("2024-03-03".to_string()),
            total_amount: Some(Decimal::new(1250, 2)),
            subtotal: Some(Decimal::new(1150, 2)),
            tax: Some(Decimal::new(100, 2)),
            items: vec![
                ExtractedItem {
                    name: Some("Milk".to_string()),
                    quantity: Some(Decimal::from(2)),
                    price: Some(Decimal::new(450, 2)),
                },
                ExtractedItem {
                    name: Some("Bread".to_string()),
                    quantity: None,
                    price: Some(Decimal::new(250, 2)),
                },
            ],
            payment_method: Some("cash".to_string()),
            category_suggestion: Some("groceries".to_string()),
        }
    }
}

#[async_trait]
impl ReceiptExtractor for MockExtractor {
    async fn extract(&self, _image: &[u8], _mime: &str) -> Result<ExtractedReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Receipt(receipt) => Ok(receipt.clone()),
            MockBehavior::Empty => Ok(ExtractedReceipt::default()),
            MockBehavior::Fail(message) => Err(Error::Extraction(message.clone())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
