//! Receipt workflow CLI commands

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use till_core::ai::{ExtractorClient, ReceiptExtractor};
use till_core::db::Database;
use till_core::ingest::{DirImageStore, ImageStore, IngestState, Ingestion, ReviewForm};
use till_core::models::{Actor, Category, Receipt, ReceiptStatus};

use super::ledger::print_entry;

/// Review form fields given on the command line
#[derive(Debug, Default)]
pub struct FormOverrides {
    pub merchant: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub category: Option<Category>,
    pub label: Option<String>,
}

impl FormOverrides {
    pub fn apply(self, mut form: ReviewForm) -> ReviewForm {
        if let Some(merchant) = self.merchant {
            form.merchant_name = merchant;
        }
        if let Some(date) = self.date {
            form.transaction_date = date;
        }
        if self.amount.is_some() {
            form.amount = self.amount;
        }
        if let Some(category) = self.category {
            form.category = category;
        }
        if self.label.is_some() {
            form.label = self.label;
        }
        form
    }
}

fn print_receipt(receipt: &Receipt) {
    let status = match receipt.status {
        ReceiptStatus::Pending => "⏳ pending",
        ReceiptStatus::Processed => "✓ processed",
        ReceiptStatus::Failed => "❌ failed",
    };
    let merchant = receipt
        .confirmed
        .as_ref()
        .map(|c| c.merchant_name.as_str())
        .or(receipt.extracted.merchant_name.as_deref())
        .unwrap_or("Unknown");
    let total = receipt
        .confirmed
        .as_ref()
        .map(|c| c.total_amount)
        .or(receipt.extracted.total_amount)
        .map(|t| format!("${}", t))
        .unwrap_or_else(|| "N/A".to_string());

    println!(
        "  #{:<5} {:<12} {} - {} (by {})",
        receipt.id, status, merchant, total, receipt.uploaded_by
    );
    if let Some(entry_id) = receipt.ledger_entry_id {
        println!("         🔗 Ledger entry #{}", entry_id);
    }
}

fn print_form(form: &ReviewForm) {
    println!("   Merchant: {}", form.merchant_name);
    println!("   Date:     {}", form.transaction_date);
    println!(
        "   Amount:   {}",
        form.amount
            .map(|a| format!("${}", a))
            .unwrap_or_else(|| "(missing)".to_string())
    );
    println!("   Category: {}", form.category.label());
}

pub fn cmd_receipts_list(db: &Database, actor: &Actor) -> Result<()> {
    let receipts = db.list_receipts(actor)?;

    if receipts.is_empty() {
        println!("No receipts. Upload one with:");
        println!("  till receipts upload receipt.jpg");
        return Ok(());
    }

    println!("\n🧾 Receipts ({})", receipts.len());
    println!("{}", "─".repeat(70));
    for receipt in &receipts {
        print_receipt(receipt);
    }
    println!();
    Ok(())
}

pub fn cmd_receipts_search(db: &Database, actor: &Actor, query: &str) -> Result<()> {
    let receipts = db.search_receipts(actor, query)?;

    if receipts.is_empty() {
        println!("No receipts match '{}'", query);
        return Ok(());
    }
    for receipt in &receipts {
        print_receipt(receipt);
    }
    Ok(())
}

/// Upload a receipt image with the extractor configured in the environment
pub async fn cmd_receipts_upload(db: &Database, actor: &Actor, file: &Path) -> Result<()> {
    let extractor = ExtractorClient::from_env().ok_or_else(|| {
        anyhow!("No receipt extractor configured. Set OPENAI_COMPATIBLE_HOST or EXTRACTOR_BACKEND=mock")
    })?;
    let images = DirImageStore::from_env();
    upload_with(db, actor, file, &images, &extractor).await
}

pub(crate) async fn upload_with(
    db: &Database,
    actor: &Actor,
    file: &Path,
    images: &dyn ImageStore,
    extractor: &dyn ReceiptExtractor,
) -> Result<()> {
    if !file.exists() {
        return Err(anyhow!("File not found: {}", file.display()));
    }
    let bytes = std::fs::read(file).context("Failed to read receipt file")?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name: {}", file.display()))?;

    println!("📤 Uploading {} (extractor: {})", file_name, extractor.name());

    let mut ingest = Ingestion::new(db, db, images, extractor, actor.clone()).with_inventory(db);
    let state = ingest
        .upload(file_name, &bytes, &mut |percent: u8| {
            print!("\r   {:>3}%", percent);
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    match state? {
        IngestState::Review { receipt_id, form } => {
            println!("🔍 Receipt #{} is ready for review:", receipt_id);
            print_form(form);
            println!();
            println!("   Confirm with: till receipts confirm {} [--amount ..] [--merchant ..]", receipt_id);
        }
        IngestState::Done {
            receipt_id, note, ..
        } => {
            println!(
                "⚠️  Receipt #{} saved but not reviewable: {}",
                receipt_id,
                note.as_deref().unwrap_or("no details")
            );
            println!("   Record the entry by hand: till ledger add ...");
        }
        other => return Err(anyhow!("Upload stopped while {}", other.name())),
    }
    Ok(())
}

/// Confirm a pending receipt, starting from its extracted fields
pub fn cmd_receipts_confirm(
    db: &Database,
    actor: &Actor,
    id: i64,
    overrides: FormOverrides,
) -> Result<()> {
    let receipt = db.get_receipt_for(actor, id)?;

    let mut ingest = Ingestion::for_review(db, db, actor.clone());
    let form = match ingest.resume(&receipt)? {
        IngestState::Review { form, .. } => overrides.apply(form.clone()),
        other => return Err(anyhow!("Receipt {} is not in review ({})", id, other.name())),
    };

    let (_, entry) = ingest.confirm(form)?;
    println!("✅ Receipt #{} confirmed as ledger entry {}:", id, entry.id);
    print_entry(&entry);
    Ok(())
}
