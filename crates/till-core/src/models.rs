//! Data models for Till

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ========== Identity ==========

/// Role of the acting user, resolved upstream of this library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Worker => "worker",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "worker" => Ok(Self::Worker),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The identity performing an operation
///
/// Passed explicitly into every store and engine call; nothing in this crate
/// reads ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn worker(id: impl Into<String>) -> Self {
        Self::new(id, Role::Worker)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Creators may mutate their own entries; admins may mutate any entry
    pub fn can_modify(&self, entry: &LedgerEntry) -> bool {
        self.is_admin() || entry.created_by == self.id
    }
}

// ========== Ledger ==========

/// Ledger category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sales,
    Expense,
    Reimbursement,
    MinistryFund,
    Offering,
}

impl Category {
    /// Every category, in column order for summaries
    pub const ALL: [Category; 5] = [
        Category::Sales,
        Category::Expense,
        Category::Reimbursement,
        Category::MinistryFund,
        Category::Offering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Expense => "expense",
            Self::Reimbursement => "reimbursement",
            Self::MinistryFund => "ministry_fund",
            Self::Offering => "offering",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sales => "Sales",
            Self::Expense => "Expense",
            Self::Reimbursement => "Reimbursement",
            Self::MinistryFund => "College Ministry Fund",
            Self::Offering => "Offering",
        }
    }

    /// Map an extractor suggestion onto the closed set, defaulting to expense
    pub fn from_suggestion(suggestion: Option<&str>) -> Self {
        suggestion
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(Self::Expense)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "expense" => Ok(Self::Expense),
            "reimbursement" => Ok(Self::Reimbursement),
            "ministry_fund" => Ok(Self::MinistryFund),
            "offering" => Ok(Self::Offering),
            _ => Err(format!(
                "Invalid category '{}'. Must be one of: sales, expense, reimbursement, ministry_fund, offering",
                s
            )),
        }
    }
}

/// Ledger entry status
///
/// Only `approved` entries contribute to summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    #[default]
    Approved,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown entry status: {}", s)),
        }
    }
}

/// A single financial record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub entry_date: NaiveDate,
    pub category: Category,
    pub amount: Decimal,
    pub description: Option<String>,
    /// Grouping tag such as a shift or event name
    pub label: Option<String>,
    /// Receipt this entry was confirmed from, if any
    pub receipt_id: Option<i64>,
    pub created_by: String,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Label with absent treated as the empty string
    pub fn label_key(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}

/// New ledger entry for creation (creator comes from the acting identity)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    /// Defaults to today when absent
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    pub category: Category,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub receipt_id: Option<i64>,
    #[serde(default)]
    pub status: EntryStatus,
}

/// Partial update for a ledger entry
///
/// Empty strings for `description` or `label` clear the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub status: Option<EntryStatus>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.entry_date.is_none()
            && self.category.is_none()
            && self.amount.is_none()
            && self.description.is_none()
            && self.label.is_none()
            && self.status.is_none()
    }
}

/// Calendar date range; either end may be open, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Single calendar day
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

// ========== Receipts ==========

/// Receipt workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Holds provisional, unconfirmed data
    #[default]
    Pending,
    /// Confirmed by a human and committed to the ledger
    Processed,
    /// Extraction failed outright
    Failed,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown receipt status: {}", s)),
        }
    }
}

/// Best-effort fields produced by the extractor (unverified)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub merchant_name: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub total_amount: Option<Decimal>,
    pub category_suggestion: Option<String>,
}

impl ExtractedFields {
    /// At least one of merchant, date, or amount came back
    pub fn is_usable(&self) -> bool {
        self.merchant_name
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
            || self.transaction_date.is_some()
            || self.total_amount.is_some()
    }
}

/// Human-confirmed receipt fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedFields {
    pub merchant_name: String,
    pub transaction_date: NaiveDate,
    pub total_amount: Decimal,
    pub category: Category,
}

/// An uploaded receipt image and its extracted/confirmed data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub uploaded_by: String,
    /// Stored image reference (file name inside the receipts directory)
    pub image_path: String,
    /// SHA256 of the image bytes
    pub content_hash: Option<String>,
    pub status: ReceiptStatus,
    pub extracted: ExtractedFields,
    pub confirmed: Option<ConfirmedFields>,
    /// Raw extractor payload (JSON)
    pub ocr_raw: Option<String>,
    /// Ledger entry created when this receipt was confirmed
    pub ledger_entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// New receipt for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReceipt {
    pub image_path: String,
    pub content_hash: Option<String>,
}

/// Partial update for a receipt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptPatch {
    #[serde(default)]
    pub status: Option<ReceiptStatus>,
    #[serde(default)]
    pub extracted: Option<ExtractedFields>,
    #[serde(default)]
    pub ocr_raw: Option<String>,
    #[serde(default)]
    pub confirmed: Option<ConfirmedFields>,
    #[serde(default)]
    pub ledger_entry_id: Option<i64>,
}

// ========== Reimbursements ==========

/// Reimbursement approval status; approved and rejected are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReimbursementStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReimbursementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for ReimbursementStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown reimbursement status: {}", s)),
        }
    }
}

/// A reimbursement request backed by one ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub id: i64,
    pub ledger_entry_id: i64,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub status: ReimbursementStatus,
    pub notes: Option<String>,
    pub payout_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    /// The backing entry, when loaded
    pub ledger_entry: Option<LedgerEntry>,
}

/// New reimbursement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReimbursement {
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub receipt_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// ========== Inventory ==========

/// A line item read off a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Counted stock record, fed from receipt line items and manual edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub last_edited_by: Option<String>,
    pub last_edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ========== Activity log ==========

/// One audit trail record
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

/// Filter for listing activity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilter {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}
