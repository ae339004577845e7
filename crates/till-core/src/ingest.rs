//! Receipt-to-ledger ingestion
//!
//! One receipt upload moves through an explicit state machine:
//!
//! ```text
//! idle -> uploading -> processing -> review -> done
//!                                \-> done (nothing usable / extraction failed)
//! ```
//!
//! `idle` is the fallback after an upload failure. A ledger entry is only ever
//! created by [`Ingestion::confirm`] from the `review` state.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::ReceiptExtractor;
use crate::error::{Error, Result};
use crate::models::{
    Actor, Category, ConfirmedFields, EntryStatus, ExtractedFields, LedgerEntry, NewLedgerEntry,
    NewReceipt, Receipt, ReceiptPatch, ReceiptStatus,
};
use crate::money;
use crate::store::{InventorySink, LedgerStore, ReceiptStore};

/// Image file extensions accepted for upload
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Environment variable for the receipt image directory
pub const RECEIPTS_DIR_ENV: &str = "TILL_RECEIPTS_DIR";

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Lowercased extension of an accepted image file name
pub fn image_extension(file_name: &str) -> Result<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| Error::InvalidData(format!("File has no extension: {}", file_name)))?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::InvalidData(format!(
            "Invalid file type '{}'. Allowed: {}",
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    Ok(ext)
}

/// MIME type for an accepted extension
pub fn image_mime(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// SHA-256 of image bytes, hex encoded
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ========== Image storage ==========

/// A stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Reference kept on the receipt
    pub image_path: String,
    pub content_hash: String,
    pub mime: &'static str,
}

/// Where uploaded images go
pub trait ImageStore: Send + Sync {
    /// Store `bytes`, reporting progress as a percentage
    fn store(
        &self,
        file_name: &str,
        bytes: &[u8],
        progress: &mut dyn FnMut(u8),
    ) -> Result<StoredImage>;

    /// Drop a stored image that never got a receipt
    fn remove(&self, image_path: &str) -> Result<()>;
}

/// Images saved as files in one directory under generated unique names
#[derive(Debug, Clone)]
pub struct DirImageStore {
    dir: PathBuf,
}

impl DirImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `TILL_RECEIPTS_DIR`, default `./receipts`
    pub fn from_env() -> Self {
        Self::new(std::env::var(RECEIPTS_DIR_ENV).unwrap_or_else(|_| "receipts".to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a stored image reference
    pub fn resolve(&self, image_path: &str) -> PathBuf {
        self.dir.join(image_path)
    }
}

impl ImageStore for DirImageStore {
    fn store(
        &self,
        file_name: &str,
        bytes: &[u8],
        progress: &mut dyn FnMut(u8),
    ) -> Result<StoredImage> {
        let ext = image_extension(file_name)?;
        if bytes.is_empty() {
            return Err(Error::InvalidData("Image is empty".to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;

        let hash = content_hash(bytes);
        let stored_name = format!(
            "{}-{}.{}",
            Utc::now().format("%Y%m%d%H%M%S%f"),
            &hash[..12],
            ext
        );
        let path = self.dir.join(&stored_name);

        let total = bytes.len();
        if let Err(e) = write_chunked(&path, bytes, progress) {
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = total, "Stored receipt image");
        Ok(StoredImage {
            image_path: stored_name,
            content_hash: hash,
            mime: image_mime(&ext),
        })
    }

    fn remove(&self, image_path: &str) -> Result<()> {
        std::fs::remove_file(self.resolve(image_path))?;
        debug!(image_path, "Removed orphaned receipt image");
        Ok(())
    }
}

fn write_chunked(path: &Path, bytes: &[u8], progress: &mut dyn FnMut(u8)) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    let total = bytes.len();
    let mut written = 0;
    progress(0);
    for chunk in bytes.chunks(UPLOAD_CHUNK) {
        file.write_all(chunk)?;
        written += chunk.len();
        progress(((written * 100) / total) as u8);
    }
    file.sync_all()
}

/// Forwards only non-decreasing percentages, capped at 100
#[derive(Debug, Default)]
struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    fn current(&self) -> u8 {
        self.last.unwrap_or(0)
    }
}

// ========== Review form ==========

/// Editable fields shown for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewForm {
    pub merchant_name: String,
    pub transaction_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub category: Category,
    #[serde(default)]
    pub label: Option<String>,
}

impl ReviewForm {
    /// Pre-fill from extracted fields; missing date is today, unknown category is expense
    pub fn prefill(fields: &ExtractedFields, today: NaiveDate) -> Self {
        Self {
            merchant_name: fields.merchant_name.clone().unwrap_or_default(),
            transaction_date: fields.transaction_date.unwrap_or(today),
            amount: fields.total_amount,
            category: Category::from_suggestion(fields.category_suggestion.as_deref()),
            label: None,
        }
    }

    /// Check the form can be committed, returning the validated amount
    pub fn validate(&self) -> Result<Decimal> {
        if self.merchant_name.trim().is_empty() {
            return Err(Error::InvalidData("Merchant name is required".to_string()));
        }
        let amount = self
            .amount
            .ok_or_else(|| Error::InvalidData("Amount is required".to_string()))?;
        money::require_positive(amount)
    }
}

// ========== State machine ==========

/// Where one upload currently is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestState {
    Idle {
        last_error: Option<String>,
    },
    Uploading {
        percent: u8,
    },
    Processing {
        receipt_id: i64,
    },
    Review {
        receipt_id: i64,
        form: ReviewForm,
    },
    Done {
        receipt_id: i64,
        entry_id: Option<i64>,
        /// Why no entry was created, when none was
        note: Option<String>,
    },
}

impl IngestState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Uploading { .. } => "uploading",
            Self::Processing { .. } => "processing",
            Self::Review { .. } => "review",
            Self::Done { .. } => "done",
        }
    }
}

impl Default for IngestState {
    fn default() -> Self {
        Self::Idle { last_error: None }
    }
}

/// Errors from ingestion transitions
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Upload failed: {0}")]
    Upload(#[source] Error),

    #[error("This session has no image store or extractor and cannot upload")]
    ReviewOnly,

    /// Form rejected; the state stays in review
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] Error),

    /// The entry exists but the receipt still reads `pending` and unlinked
    #[error("Ledger entry {entry_id} created but receipt {receipt_id} was not linked: {source}")]
    ReceiptLinkFailed {
        receipt_id: i64,
        entry_id: i64,
        #[source]
        source: Error,
    },
}

/// Drives one receipt at a time from upload to commit
pub struct Ingestion<'a> {
    ledger: &'a dyn LedgerStore,
    receipts: &'a dyn ReceiptStore,
    images: Option<&'a dyn ImageStore>,
    extractor: Option<&'a dyn ReceiptExtractor>,
    inventory: Option<&'a dyn InventorySink>,
    actor: Actor,
    today: NaiveDate,
    state: IngestState,
}

impl<'a> Ingestion<'a> {
    pub fn new(
        ledger: &'a dyn LedgerStore,
        receipts: &'a dyn ReceiptStore,
        images: &'a dyn ImageStore,
        extractor: &'a dyn ReceiptExtractor,
        actor: Actor,
    ) -> Self {
        Self {
            images: Some(images),
            extractor: Some(extractor),
            ..Self::for_review(ledger, receipts, actor)
        }
    }

    /// A session that can only review and commit receipts already uploaded
    pub fn for_review(
        ledger: &'a dyn LedgerStore,
        receipts: &'a dyn ReceiptStore,
        actor: Actor,
    ) -> Self {
        Self {
            ledger,
            receipts,
            images: None,
            extractor: None,
            inventory: None,
            actor,
            today: Local::now().date_naive(),
            state: IngestState::default(),
        }
    }

    /// Feed extracted line items to an inventory sink
    pub fn with_inventory(mut self, sink: &'a dyn InventorySink) -> Self {
        self.inventory = Some(sink);
        self
    }

    /// Override "today" (the default review date)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn state(&self) -> &IngestState {
        &self.state
    }

    fn invalid(&self, action: &'static str) -> IngestError {
        IngestError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Upload an image, extract it, and stop in `review` or `done`
    ///
    /// Allowed from `idle` or `done`. Progress percentages passed to
    /// `on_progress` never decrease.
    pub async fn upload(
        &mut self,
        file_name: &str,
        image: &[u8],
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> std::result::Result<&IngestState, IngestError> {
        if !matches!(self.state, IngestState::Idle { .. } | IngestState::Done { .. }) {
            return Err(self.invalid("upload"));
        }
        let (Some(images), Some(extractor)) = (self.images, self.extractor) else {
            return Err(IngestError::ReviewOnly);
        };

        self.state = IngestState::Uploading { percent: 0 };
        let mut tracker = ProgressTracker::default();
        let stored = images.store(file_name, image, &mut |percent| {
            if let Some(p) = tracker.advance(percent) {
                on_progress(p);
            }
        });
        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                warn!(file = file_name, error = %e, "Receipt upload failed");
                self.state = IngestState::Idle {
                    last_error: Some(e.to_string()),
                };
                return Err(IngestError::Upload(e));
            }
        };
        self.state = IngestState::Uploading {
            percent: tracker.current(),
        };

        let receipt = match self.receipts.create_receipt(
            &self.actor,
            &NewReceipt {
                image_path: stored.image_path.clone(),
                content_hash: Some(stored.content_hash.clone()),
            },
        ) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(file = file_name, error = %e, "Receipt record could not be created");
                if let Err(cleanup) = images.remove(&stored.image_path) {
                    warn!(image_path = %stored.image_path, error = %cleanup, "Failed to remove orphaned image");
                }
                self.state = IngestState::Idle {
                    last_error: Some(e.to_string()),
                };
                return Err(IngestError::Upload(e));
            }
        };

        self.state = IngestState::Processing {
            receipt_id: receipt.id,
        };
        info!(receipt_id = receipt.id, extractor = extractor.name(), "Extracting receipt");

        self.state = match extractor.extract(image, stored.mime).await {
            Err(e) => {
                warn!(receipt_id = receipt.id, error = %e, "Receipt extraction failed");
                self.patch_receipt(
                    receipt.id,
                    ReceiptPatch {
                        status: Some(ReceiptStatus::Failed),
                        ..Default::default()
                    },
                );
                IngestState::Done {
                    receipt_id: receipt.id,
                    entry_id: None,
                    note: Some(format!("Extraction failed: {}", e)),
                }
            }
            Ok(extracted) => {
                let fields = extracted.fields();
                self.patch_receipt(
                    receipt.id,
                    ReceiptPatch {
                        extracted: Some(fields.clone()),
                        ocr_raw: Some(extracted.to_raw_json()),
                        ..Default::default()
                    },
                );

                if let Some(sink) = self.inventory {
                    let items = extracted.line_items();
                    if !items.is_empty() {
                        if let Err(e) = sink.add_items(&self.actor, &items) {
                            warn!(receipt_id = receipt.id, error = %e, "Failed to add receipt items to inventory");
                        }
                    }
                }

                if fields.is_usable() {
                    IngestState::Review {
                        receipt_id: receipt.id,
                        form: ReviewForm::prefill(&fields, self.today),
                    }
                } else {
                    IngestState::Done {
                        receipt_id: receipt.id,
                        entry_id: None,
                        note: Some("Nothing usable was extracted".to_string()),
                    }
                }
            }
        };

        Ok(&self.state)
    }

    /// Re-open review for a receipt that is still pending
    ///
    /// Used when review happens in a later request than the upload.
    pub fn resume(&mut self, receipt: &Receipt) -> std::result::Result<&IngestState, IngestError> {
        if !matches!(self.state, IngestState::Idle { .. } | IngestState::Done { .. }) {
            return Err(self.invalid("resume review"));
        }
        if receipt.status != ReceiptStatus::Pending || receipt.ledger_entry_id.is_some() {
            return Err(IngestError::Validation(format!(
                "Receipt {} is {} and cannot be reviewed",
                receipt.id,
                receipt.status.as_str()
            )));
        }

        self.state = IngestState::Review {
            receipt_id: receipt.id,
            form: ReviewForm::prefill(&receipt.extracted, self.today),
        };
        Ok(&self.state)
    }

    /// Commit the reviewed form: one ledger entry, receipt marked processed and linked
    ///
    /// A validation failure keeps the state in `review` (with the submitted form)
    /// and writes nothing.
    pub fn confirm(
        &mut self,
        form: ReviewForm,
    ) -> std::result::Result<(&IngestState, LedgerEntry), IngestError> {
        let receipt_id = match &self.state {
            IngestState::Review { receipt_id, .. } => *receipt_id,
            _ => return Err(self.invalid("confirm")),
        };

        let amount = match form.validate() {
            Ok(amount) => amount,
            Err(e) => {
                self.state = IngestState::Review { receipt_id, form };
                return Err(IngestError::Validation(e.to_string()));
            }
        };

        let merchant = form.merchant_name.trim().to_string();
        let entry = match self.ledger.create_entry(
            &self.actor,
            &NewLedgerEntry {
                entry_date: Some(form.transaction_date),
                category: form.category,
                amount,
                description: Some(merchant.clone()),
                label: form.label.clone(),
                receipt_id: Some(receipt_id),
                status: EntryStatus::Approved,
            },
        ) {
            Ok(entry) => entry,
            Err(e) => {
                self.state = IngestState::Review { receipt_id, form };
                return Err(if e.is_validation() {
                    IngestError::Validation(e.to_string())
                } else {
                    IngestError::Store(e)
                });
            }
        };

        let link = self.receipts.update_receipt(
            &self.actor,
            receipt_id,
            &ReceiptPatch {
                status: Some(ReceiptStatus::Processed),
                confirmed: Some(ConfirmedFields {
                    merchant_name: merchant,
                    transaction_date: form.transaction_date,
                    total_amount: amount,
                    category: form.category,
                }),
                ledger_entry_id: Some(entry.id),
                ..Default::default()
            },
        );

        self.state = IngestState::Done {
            receipt_id,
            entry_id: Some(entry.id),
            note: None,
        };

        match link {
            Ok(_) => {
                info!(receipt_id, entry_id = entry.id, "Receipt confirmed");
                Ok((&self.state, entry))
            }
            Err(source) => {
                warn!(receipt_id, entry_id = entry.id, error = %source, "Receipt link failed after entry creation");
                Err(IngestError::ReceiptLinkFailed {
                    receipt_id,
                    entry_id: entry.id,
                    source,
                })
            }
        }
    }

    /// Abandon review; the receipt stays pending and no entry is created
    pub fn cancel(&mut self) -> std::result::Result<&IngestState, IngestError> {
        if !matches!(self.state, IngestState::Review { .. }) {
            return Err(self.invalid("cancel"));
        }
        self.state = IngestState::default();
        Ok(&self.state)
    }

    /// Return to `idle` after `done`
    pub fn reset(&mut self) -> std::result::Result<&IngestState, IngestError> {
        if !matches!(self.state, IngestState::Done { .. }) {
            return Err(self.invalid("reset"));
        }
        self.state = IngestState::default();
        Ok(&self.state)
    }

    fn patch_receipt(&self, receipt_id: i64, patch: ReceiptPatch) {
        if let Err(e) = self.receipts.update_receipt(&self.actor, receipt_id, &patch) {
            warn!(receipt_id, error = %e, "Failed to record extraction on receipt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ExtractedReceipt, MockExtractor};
    use crate::db::Database;
    use crate::models::DateRange;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn acme() -> MockExtractor {
        MockExtractor::with_receipt(ExtractedReceipt {
            merchant_name: Some("Acme".into()),
            total_amount: Some(dec!(12.5)),
            transaction_date: Some("2024-03-03".into()),
            ..Default::default()
        })
    }

    /// Receipt store whose updates always fail
    struct BrokenReceipts<'a>(&'a Database);

    impl ReceiptStore for BrokenReceipts<'_> {
        fn create_receipt(&self, actor: &Actor, receipt: &NewReceipt) -> Result<Receipt> {
            self.0.create_receipt(actor, receipt)
        }

        fn update_receipt(&self, _: &Actor, _: i64, _: &ReceiptPatch) -> Result<Receipt> {
            Err(Error::InvalidData("receipt store offline".into()))
        }

        fn list_receipts(&self, actor: &Actor) -> Result<Vec<Receipt>> {
            self.0.list_receipts(actor)
        }

        fn search_receipts(&self, actor: &Actor, text: &str) -> Result<Vec<Receipt>> {
            self.0.search_receipts(actor, text)
        }
    }

    #[test]
    fn test_image_extension_validation() {
        assert_eq!(image_extension("a.JPG").unwrap(), "jpg");
        assert_eq!(image_mime("webp"), "image/webp");
        assert!(image_extension("notes.pdf").is_err());
        assert!(image_extension("noext").is_err());
    }

    #[test]
    fn test_progress_tracker_is_monotonic() {
        let mut tracker = ProgressTracker::default();
        let seen: Vec<u8> = [0, 10, 5, 10, 50, 200]
            .iter()
            .filter_map(|p| tracker.advance(*p))
            .collect();
        assert_eq!(seen, vec![0, 10, 50, 100]);
    }

    #[test]
    fn test_review_form_defaults() {
        let form = ReviewForm::prefill(
            &ExtractedFields {
                merchant_name: Some("Acme".into()),
                category_suggestion: Some("Office Supplies".into()),
                ..Default::default()
            },
            date("2024-05-05"),
        );
        assert_eq!(form.category, Category::Expense);
        assert_eq!(form.transaction_date, date("2024-05-05"));
        assert!(form.validate().is_err());
    }

    #[tokio::test]
    async fn test_upload_review_confirm_creates_one_entry() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();
        let actor = Actor::worker("ana");

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, actor.clone());
        let mut progress = Vec::new();
        let state = ingest
            .upload("receipt.png", &vec![7u8; 200_000], &mut |p| progress.push(p))
            .await
            .unwrap()
            .clone();

        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));

        let (receipt_id, mut form) = match state {
            IngestState::Review { receipt_id, form } => (receipt_id, form),
            other => panic!("expected review, got {:?}", other),
        };
        assert_eq!(form.merchant_name, "Acme");
        assert_eq!(form.amount, Some(dec!(12.5)));
        assert_eq!(form.transaction_date, date("2024-03-03"));
        assert_eq!(form.category, Category::Expense);
        assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());

        form.amount = Some(dec!(15.0));
        let (state, entry) = ingest.confirm(form).unwrap();
        assert_eq!(
            state,
            &IngestState::Done {
                receipt_id,
                entry_id: Some(entry.id),
                note: None
            }
        );
        assert_eq!(entry.amount, dec!(15.00));
        assert_eq!(entry.category, Category::Expense);
        assert_eq!(entry.receipt_id, Some(receipt_id));
        assert_eq!(entry.description.as_deref(), Some("Acme"));

        let entries = db.list_entries(&DateRange::unbounded()).unwrap();
        assert_eq!(entries.len(), 1);

        let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Processed);
        assert_eq!(receipt.ledger_entry_id, Some(entry.id));
        assert_eq!(receipt.confirmed.unwrap().total_amount, dec!(15.00));
        assert_eq!(receipt.extracted.total_amount, Some(dec!(12.50)));
        assert!(dir.path().join(&receipt.image_path).exists());

        ingest.reset().unwrap();
        assert_eq!(ingest.state().name(), "idle");
    }

    #[tokio::test]
    async fn test_nothing_usable_goes_straight_to_done() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = MockExtractor::empty();

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, Actor::worker("ana"));
        let state = ingest.upload("r.jpg", b"jpeg", &mut |_| {}).await.unwrap();
        let receipt_id = match state {
            IngestState::Done {
                receipt_id,
                entry_id: None,
                ..
            } => *receipt_id,
            other => panic!("expected done, got {:?}", other),
        };

        assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());
        let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert!(receipt.confirmed.is_none());
    }

    #[tokio::test]
    async fn test_extraction_failure_marks_receipt_failed() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = MockExtractor::failing("model unavailable");

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, Actor::worker("ana"));
        let state = ingest.upload("r.jpg", b"jpeg", &mut |_| {}).await.unwrap();
        let IngestState::Done {
            receipt_id, note, ..
        } = state.clone()
        else {
            panic!("expected done");
        };
        assert!(note.unwrap().contains("model unavailable"));
        assert_eq!(
            db.get_receipt(receipt_id).unwrap().unwrap().status,
            ReceiptStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_upload_failure_returns_to_idle_without_receipt() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();
        let actor = Actor::admin("boss");

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, actor.clone());
        let err = ingest
            .upload("receipt.gif", b"gif", &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Upload(_)));
        assert!(matches!(
            ingest.state(),
            IngestState::Idle {
                last_error: Some(_)
            }
        ));
        assert!(db.list_receipts(&actor).unwrap().is_empty());
        assert_eq!(extractor.calls(), 0);
    }

    /// Receipt store that cannot create records
    struct FullReceipts<'a>(&'a Database);

    impl ReceiptStore for FullReceipts<'_> {
        fn create_receipt(&self, _: &Actor, _: &NewReceipt) -> Result<Receipt> {
            Err(Error::InvalidData("receipt table full".into()))
        }

        fn update_receipt(&self, actor: &Actor, id: i64, patch: &ReceiptPatch) -> Result<Receipt> {
            self.0.update_receipt(actor, id, patch)
        }

        fn list_receipts(&self, actor: &Actor) -> Result<Vec<Receipt>> {
            self.0.list_receipts(actor)
        }

        fn search_receipts(&self, actor: &Actor, text: &str) -> Result<Vec<Receipt>> {
            self.0.search_receipts(actor, text)
        }
    }

    #[tokio::test]
    async fn test_receipt_create_failure_removes_stored_image() {
        let db = Database::in_memory().unwrap();
        let full = FullReceipts(&db);
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();

        let mut ingest = Ingestion::new(&db, &full, &images, &extractor, Actor::worker("ana"));
        let err = ingest
            .upload("r.png", b"png", &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Upload(_)));
        assert!(matches!(ingest.state(), IngestState::Idle { last_error: Some(_) }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(extractor.calls(), 0);
    }

    #[test]
    fn test_dir_image_store_remove() {
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let stored = images.store("a.jpg", b"jpeg", &mut |_| {}).unwrap();
        assert!(images.resolve(&stored.image_path).exists());

        images.remove(&stored.image_path).unwrap();
        assert!(!images.resolve(&stored.image_path).exists());
        assert!(images.remove(&stored.image_path).is_err());
    }

    #[tokio::test]
    async fn test_oversized_extracted_amount_is_dropped() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = MockExtractor::with_receipt(ExtractedReceipt {
            merchant_name: Some("Acme".into()),
            total_amount: Some(Decimal::from_i128_with_scale(10i128.pow(27), 0)),
            ..Default::default()
        });
        let actor = Actor::worker("ana");

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, actor.clone());
        let state = ingest
            .upload("r.png", b"png", &mut |_| {})
            .await
            .unwrap()
            .clone();
        let IngestState::Review { receipt_id, form } = state.clone() else {
            panic!("expected review, got {:?}", state);
        };
        assert_eq!(form.amount, None);

        let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert_eq!(receipt.extracted.merchant_name.as_deref(), Some("Acme"));
        assert_eq!(receipt.extracted.total_amount, None);
    }

    #[tokio::test]
    async fn test_invalid_confirm_stays_in_review() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();

        let mut ingest = Ingestion::new(&db, &db, &images, &extractor, Actor::worker("ana"));
        ingest.upload("r.png", b"png", &mut |_| {}).await.unwrap();
        let IngestState::Review { form, .. } = ingest.state().clone() else {
            panic!("expected review");
        };

        for bad in [
            ReviewForm {
                amount: Some(dec!(0)),
                ..form.clone()
            },
            ReviewForm {
                amount: Some(dec!(-3)),
                ..form.clone()
            },
            ReviewForm {
                merchant_name: "  ".into(),
                ..form.clone()
            },
        ] {
            let err = ingest.confirm(bad.clone()).unwrap_err();
            assert!(matches!(err, IngestError::Validation(_)));
            assert!(matches!(ingest.state(), IngestState::Review { form, .. } if *form == bad));
        }
        assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());

        ingest.cancel().unwrap();
        assert_eq!(ingest.state().name(), "idle");
        assert!(matches!(
            ingest.confirm(form),
            Err(IngestError::InvalidTransition { .. })
        ));
        assert!(db.list_entries(&DateRange::unbounded()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_link_failure_is_reported() {
        let db = Database::in_memory().unwrap();
        let broken = BrokenReceipts(&db);
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();

        let mut ingest = Ingestion::new(&db, &broken, &images, &extractor, Actor::worker("ana"));
        ingest.upload("r.png", b"png", &mut |_| {}).await.unwrap();
        let IngestState::Review { receipt_id, form } = ingest.state().clone() else {
            panic!("expected review");
        };

        let entry_id = match ingest.confirm(form) {
            Err(IngestError::ReceiptLinkFailed { entry_id, .. }) => entry_id,
            other => panic!("expected link failure, got {:?}", other.map(|(_, e)| e.id)),
        };
        assert!(matches!(
            ingest.state(),
            IngestState::Done { entry_id: Some(id), .. } if *id == entry_id
        ));

        // the entry exists, the receipt is still pending and unlinked
        assert_eq!(db.list_entries(&DateRange::unbounded()).unwrap().len(), 1);
        let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert!(receipt.ledger_entry_id.is_none());
    }

    #[tokio::test]
    async fn test_inventory_sink_receives_line_items() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = MockExtractor::new();
        let actor = Actor::worker("ana");

        let mut ingest =
            Ingestion::new(&db, &db, &images, &extractor, actor.clone()).with_inventory(&db);
        ingest.upload("r.png", b"png", &mut |_| {}).await.unwrap();
        ingest.cancel().unwrap();
        ingest.upload("r.png", b"png", &mut |_| {}).await.unwrap();

        let items = db.list_inventory().unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Bread", "Milk"]);
        assert_eq!(items[0].quantity, dec!(2));
        assert_eq!(items[1].quantity, dec!(4));
    }

    #[tokio::test]
    async fn test_resume_pending_receipt() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let images = DirImageStore::new(dir.path());
        let extractor = acme();
        let actor = Actor::worker("ana");

        let receipt_id = {
            let mut ingest = Ingestion::new(&db, &db, &images, &extractor, actor.clone());
            ingest.upload("r.png", b"png", &mut |_| {}).await.unwrap();
            let IngestState::Review { receipt_id, .. } = ingest.state().clone() else {
                panic!("expected review");
            };
            receipt_id
        };

        let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
        let mut later = Ingestion::for_review(&db, &db, actor.clone());
        let IngestState::Review { form, .. } = later.resume(&receipt).unwrap().clone() else {
            panic!("expected review");
        };
        assert_eq!(form.merchant_name, "Acme");
        later.confirm(form).unwrap();

        let processed = db.get_receipt(receipt_id).unwrap().unwrap();
        let mut again = Ingestion::for_review(&db, &db, actor);
        assert!(matches!(
            again.resume(&processed),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            again.upload("r.png", b"png", &mut |_| {}).await,
            Err(IngestError::ReviewOnly)
        ));
    }
}
