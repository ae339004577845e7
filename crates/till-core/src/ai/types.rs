//! Receipt extractor response types
//!
//! These types are backend-agnostic. Extractors are unreliable, so every field is
//! optional and amounts are read leniently (numbers, numeric strings, "$12.50").

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ExtractedFields, ReceiptLineItem};
use crate::money;

/// Read an amount from a JSON number or string; unreadable values become `None`
fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .map(money::normalize)
            .or_else(|| n.as_f64().and_then(money::from_f64)),
        Some(serde_json::Value::String(s)) => money::parse_amount(&s).ok(),
        _ => None,
    })
}

/// One line item as returned by the extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub price: Option<Decimal>,
}

/// Full structured extraction of a receipt image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    #[serde(default)]
    pub merchant_name: Option<String>,
    /// As returned; only `YYYY-MM-DD` is accepted as a date
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub subtotal: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub tax: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub category_suggestion: Option<String>,
}

impl ExtractedReceipt {
    /// The fields that drive review: merchant, date, amount, category suggestion
    pub fn fields(&self) -> ExtractedFields {
        ExtractedFields {
            merchant_name: self
                .merchant_name
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from),
            transaction_date: self
                .transaction_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
            total_amount: self
                .total_amount
                .filter(|a| *a > Decimal::ZERO && money::to_cents(*a).is_ok()),
            category_suggestion: self.category_suggestion.clone(),
        }
    }

    /// Named line items for the inventory sink
    pub fn line_items(&self) -> Vec<ReceiptLineItem> {
        self.items
            .iter()
            .filter_map(|item| {
                let name = item.name.as_deref()?.trim();
                if name.is_empty() {
                    return None;
                }
                Some(ReceiptLineItem {
                    name: name.to_string(),
                    quantity: item.quantity,
                    price: item.price,
                })
            })
            .collect()
    }

    /// Raw payload as stored on the receipt
    pub fn to_raw_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lenient_amounts() {
        let receipt: ExtractedReceipt = serde_json::from_str(
            r#"{"merchant_name": "Acme", "total_amount": "$1,012.50", "subtotal": 10,
                "tax": "n/a", "items": [{"name": "Flour", "quantity": 2, "price": 3.1}]}"#,
        )
        .unwrap();
        assert_eq!(receipt.total_amount, Some(dec!(1012.50)));
        assert_eq!(receipt.subtotal, Some(dec!(10.00)));
        assert_eq!(receipt.tax, None);
        assert_eq!(receipt.items[0].price, Some(dec!(3.10)));
    }

    #[test]
    fn test_out_of_range_total_is_not_usable() {
        let receipt: ExtractedReceipt =
            serde_json::from_str(r#"{"merchant_name": "Acme", "total_amount": 1e27}"#).unwrap();
        let fields = receipt.fields();
        assert_eq!(fields.total_amount, None);
        assert_eq!(fields.merchant_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_fields_discard_unusable_values() {
        let receipt = ExtractedReceipt {
            merchant_name: Some("   ".into()),
            transaction_date: Some("03/03/2024".into()),
            total_amount: Some(dec!(0)),
            ..Default::default()
        };
        let fields = receipt.fields();
        assert!(!fields.is_usable());

        let receipt = ExtractedReceipt {
            merchant_name: Some(" Acme ".into()),
            transaction_date: Some("2024-03-03".into()),
            total_amount: Some(dec!(12.5)),
            ..Default::default()
        };
        let fields = receipt.fields();
        assert_eq!(fields.merchant_name.as_deref(), Some("Acme"));
        assert_eq!(fields.transaction_date, NaiveDate::from_ymd_opt(2024, 3, 3));
        assert_eq!(fields.total_amount, Some(dec!(12.5)));
    }

    #[test]
    fn test_line_items_skip_unnamed() {
        let receipt = ExtractedReceipt {
            items: vec![
                ExtractedItem {
                    name: Some("Sugar".into()),
                    quantity: None,
                    price: None,
                },
                ExtractedItem::default(),
            ],
            ..Default::default()
        };
        let items = receipt.line_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Sugar");
    }
}
