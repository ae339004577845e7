//! JSON parsing helpers for extractor responses
//!
//! Vision models often wrap the JSON payload in prose or a Markdown code fence.

use crate::error::{Error, Result};

use super::types::ExtractedReceipt;

fn truncate(s: &str) -> String {
    if s.len() > 200 {
        let mut end = 200;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

/// Slice out the outermost JSON object in a model response
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Parse a receipt extraction from a model response
pub fn parse_receipt_response(response: &str) -> Result<ExtractedReceipt> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        Error::Extraction(format!(
            "No JSON found in receipt response | Raw: {}",
            truncate(response.trim())
        ))
    })?;

    serde_json::from_str(json_str).map_err(|e| {
        Error::Extraction(format!(
            "Invalid receipt JSON: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })
}
