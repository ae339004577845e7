//! Daily summary aggregation
//!
//! Groups approved ledger entries by `(entry_date, created_by, label)` and totals
//! each category per group. Output rows are ordered by date, then creator, then
//! label, so the same input always yields the same sequence.
//!
//! The SQL mirror in `Database::daily_summary` is the primary read path; this
//! in-memory projection exists so callers can work out which raw entries make
//! up a row (see [`crate::reconcile`]).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Category, DateRange, EntryStatus, LedgerEntry};

/// Environment variable holding net-profit coefficients
pub const NET_PROFIT_ENV: &str = "TILL_NET_PROFIT";

/// Linear net-profit rule over the five category sums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetProfitFormula {
    pub sales: Decimal,
    pub expense: Decimal,
    pub reimbursement: Decimal,
    pub ministry_fund: Decimal,
    pub offering: Decimal,
}

impl Default for NetProfitFormula {
    /// `sales - expense - reimbursement - ministry_fund`; offering is tracked but not counted
    fn default() -> Self {
        Self {
            sales: Decimal::ONE,
            expense: Decimal::NEGATIVE_ONE,
            reimbursement: Decimal::NEGATIVE_ONE,
            ministry_fund: Decimal::NEGATIVE_ONE,
            offering: Decimal::ZERO,
        }
    }
}

impl NetProfitFormula {
    /// All coefficients zero
    pub fn zero() -> Self {
        Self {
            sales: Decimal::ZERO,
            expense: Decimal::ZERO,
            reimbursement: Decimal::ZERO,
            ministry_fund: Decimal::ZERO,
            offering: Decimal::ZERO,
        }
    }

    pub fn coefficient(&self, category: Category) -> Decimal {
        match category {
            Category::Sales => self.sales,
            Category::Expense => self.expense,
            Category::Reimbursement => self.reimbursement,
            Category::MinistryFund => self.ministry_fund,
            Category::Offering => self.offering,
        }
    }

    pub fn with_coefficient(mut self, category: Category, coefficient: Decimal) -> Self {
        match category {
            Category::Sales => self.sales = coefficient,
            Category::Expense => self.expense = coefficient,
            Category::Reimbursement => self.reimbursement = coefficient,
            Category::MinistryFund => self.ministry_fund = coefficient,
            Category::Offering => self.offering = coefficient,
        }
        self
    }

    /// Parse `category=coef` pairs separated by commas
    ///
    /// Categories not listed get a coefficient of zero, so `sales=1,expense=-1`
    /// is the plain sales-minus-expenses rule.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut formula = Self::zero();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, coef) = pair.split_once('=').ok_or_else(|| {
                Error::InvalidData(format!("Expected category=coefficient, got '{}'", pair))
            })?;
            let category: Category = name.trim().parse().map_err(Error::InvalidData)?;
            let coef: Decimal = coef.trim().parse().map_err(|_| {
                Error::InvalidData(format!("Invalid coefficient for {}: '{}'", name, coef))
            })?;
            formula = formula.with_coefficient(category, coef);
        }
        Ok(formula)
    }

    /// Read `TILL_NET_PROFIT`, falling back to the default rule when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(NET_PROFIT_ENV) {
            Ok(spec) if !spec.trim().is_empty() => Self::parse(&spec),
            _ => Ok(Self::default()),
        }
    }

    pub fn apply(&self, totals: &CategoryTotals) -> Decimal {
        Category::ALL
            .iter()
            .map(|c| self.coefficient(*c) * totals.get(*c))
            .sum()
    }
}

/// Per-category sums plus derived net profit
///
/// Every category is always present; absent categories are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub sales: Decimal,
    pub expense: Decimal,
    pub reimbursement: Decimal,
    pub ministry_fund: Decimal,
    pub offering: Decimal,
    pub net_profit: Decimal,
}

impl Default for CategoryTotals {
    fn default() -> Self {
        let zero = crate::money::normalize(Decimal::ZERO);
        Self {
            sales: zero,
            expense: zero,
            reimbursement: zero,
            ministry_fund: zero,
            offering: zero,
            net_profit: zero,
        }
    }
}

impl CategoryTotals {
    pub fn get(&self, category: Category) -> Decimal {
        match category {
            Category::Sales => self.sales,
            Category::Expense => self.expense,
            Category::Reimbursement => self.reimbursement,
            Category::MinistryFund => self.ministry_fund,
            Category::Offering => self.offering,
        }
    }

    fn slot(&mut self, category: Category) -> &mut Decimal {
        match category {
            Category::Sales => &mut self.sales,
            Category::Expense => &mut self.expense,
            Category::Reimbursement => &mut self.reimbursement,
            Category::MinistryFund => &mut self.ministry_fund,
            Category::Offering => &mut self.offering,
        }
    }

    /// Add an amount to its category (net profit is not touched)
    pub fn add(&mut self, category: Category, amount: Decimal) {
        *self.slot(category) += amount;
    }

    /// Recompute `net_profit` from the category sums
    pub fn finish(mut self, formula: &NetProfitFormula) -> Self {
        self.net_profit = crate::money::normalize(formula.apply(&self));
        self
    }

    /// Element-wise sum, including net profit
    pub fn accumulate(&mut self, other: &CategoryTotals) {
        for category in Category::ALL {
            self.add(category, other.get(category));
        }
        self.net_profit += other.net_profit;
    }
}

/// Grouping key of a daily summary row
///
/// An absent label is stored as the empty string so `None` and `""` group together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryKey {
    pub entry_date: NaiveDate,
    pub created_by: String,
    #[serde(default)]
    pub label: String,
}

impl SummaryKey {
    pub fn new(entry_date: NaiveDate, created_by: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            entry_date,
            created_by: created_by.into(),
            label: label.unwrap_or("").to_string(),
        }
    }

    pub fn of(entry: &LedgerEntry) -> Self {
        Self::new(entry.entry_date, entry.created_by.clone(), entry.label.as_deref())
    }

    /// True when an entry carries exactly this key (status is not considered)
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        entry.entry_date == self.entry_date
            && entry.created_by == self.created_by
            && entry.label_key() == self.label
    }
}

impl std::fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / '{}'", self.entry_date, self.created_by, self.label)
    }
}

/// One aggregated row; identified only by its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    #[serde(flatten)]
    pub key: SummaryKey,
    #[serde(flatten)]
    pub totals: CategoryTotals,
}

/// Rows for a date range plus the totals row (absent when there are no rows)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub rows: Vec<DailySummaryRow>,
    pub totals: Option<CategoryTotals>,
}

impl DailySummary {
    /// Build the totals row from already-computed rows
    pub fn from_rows(rows: Vec<DailySummaryRow>) -> Self {
        let totals = if rows.is_empty() {
            None
        } else {
            let mut totals = CategoryTotals::default();
            for row in &rows {
                totals.accumulate(&row.totals);
            }
            Some(totals)
        };
        Self { rows, totals }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the row for a key
    pub fn row(&self, key: &SummaryKey) -> Option<&DailySummaryRow> {
        self.rows.iter().find(|r| &r.key == key)
    }
}

/// Aggregate approved entries within `range` into daily summary rows
///
/// Entries that are not approved or fall outside the range are ignored.
pub fn aggregate(
    entries: &[LedgerEntry],
    range: &DateRange,
    formula: &NetProfitFormula,
) -> DailySummary {
    let mut groups: BTreeMap<SummaryKey, CategoryTotals> = BTreeMap::new();

    for entry in entries
        .iter()
        .filter(|e| e.status == EntryStatus::Approved && range.contains(e.entry_date))
    {
        groups
            .entry(SummaryKey::of(entry))
            .or_default()
            .add(entry.category, entry.amount);
    }

    let rows = groups
        .into_iter()
        .map(|(key, totals)| DailySummaryRow {
            key,
            totals: totals.finish(formula),
        })
        .collect();

    DailySummary::from_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(
        id: i64,
        day: &str,
        who: &str,
        label: Option<&str>,
        category: Category,
        amount: Decimal,
    ) -> LedgerEntry {
        LedgerEntry {
            id,
            entry_date: date(day),
            category,
            amount,
            description: None,
            label: label.map(String::from),
            receipt_id: None,
            created_by: who.to_string(),
            status: EntryStatus::Approved,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sales_minus_expense_single_row() {
        let entries = vec![
            entry(1, "2024-03-01", "userA", None, Category::Sales, dec!(100)),
            entry(2, "2024-03-01", "userA", Some(""), Category::Expense, dec!(20)),
        ];
        let formula = NetProfitFormula::parse("sales=1,expense=-1").unwrap();
        let summary = aggregate(&entries, &DateRange::unbounded(), &formula);

        assert_eq!(summary.rows.len(), 1);
        let row = &summary.rows[0];
        assert_eq!(row.key.label, "");
        assert_eq!(row.totals.sales, dec!(100));
        assert_eq!(row.totals.expense, dec!(20));
        assert_eq!(row.totals.reimbursement, dec!(0));
        assert_eq!(row.totals.ministry_fund, dec!(0));
        assert_eq!(row.totals.offering, dec!(0));
        assert_eq!(row.totals.net_profit, dec!(80));
    }

    #[test]
    fn test_empty_input_has_no_totals_row() {
        let summary = aggregate(&[], &DateRange::unbounded(), &NetProfitFormula::default());
        assert!(summary.rows.is_empty());
        assert!(summary.totals.is_none());
    }

    #[test]
    fn test_excludes_unapproved_and_out_of_range() {
        let mut pending = entry(1, "2024-03-01", "a", None, Category::Sales, dec!(50));
        pending.status = EntryStatus::Pending;
        let mut rejected = entry(2, "2024-03-01", "a", None, Category::Sales, dec!(60));
        rejected.status = EntryStatus::Rejected;
        let outside = entry(3, "2024-04-01", "a", None, Category::Sales, dec!(70));
        let inside = entry(4, "2024-03-31", "a", None, Category::Sales, dec!(10));

        let range = DateRange::new(date("2024-03-01"), date("2024-03-31"));
        let summary = aggregate(
            &[pending, rejected, outside, inside],
            &range,
            &NetProfitFormula::default(),
        );
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].key.entry_date, date("2024-03-31"));
        assert_eq!(summary.totals.unwrap().sales, dec!(10));
    }

    #[test]
    fn test_rows_partition_entries_and_totals_sum_rows() {
        let entries = vec![
            entry(1, "2024-03-02", "b", Some("lunch"), Category::Expense, dec!(5)),
            entry(2, "2024-03-02", "b", Some("lunch"), Category::Expense, dec!(7)),
            entry(3, "2024-03-01", "b", None, Category::Sales, dec!(40)),
            entry(4, "2024-03-01", "a", None, Category::Offering, dec!(3)),
            entry(5, "2024-03-01", "a", Some("event"), Category::MinistryFund, dec!(8)),
            entry(6, "2024-03-02", "a", None, Category::Reimbursement, dec!(2.50)),
        ];
        let summary = aggregate(&entries, &DateRange::unbounded(), &NetProfitFormula::default());

        let keys: Vec<_> = summary
            .rows
            .iter()
            .map(|r| (r.key.entry_date, r.key.created_by.as_str(), r.key.label.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (date("2024-03-01"), "a", ""),
                (date("2024-03-01"), "a", "event"),
                (date("2024-03-01"), "b", ""),
                (date("2024-03-02"), "a", ""),
                (date("2024-03-02"), "b", "lunch"),
            ]
        );

        let totals = summary.totals.unwrap();
        for category in Category::ALL {
            let from_entries: Decimal = entries
                .iter()
                .filter(|e| e.category == category)
                .map(|e| e.amount)
                .sum();
            let from_rows: Decimal = summary.rows.iter().map(|r| r.totals.get(category)).sum();
            assert_eq!(from_rows, from_entries, "{}", category);
            assert_eq!(totals.get(category), from_entries, "{}", category);
        }
        let net: Decimal = summary.rows.iter().map(|r| r.totals.net_profit).sum();
        assert_eq!(totals.net_profit, net);
        // 40 - 5 - 7 - 8 - 2.50, offering excluded
        assert_eq!(totals.net_profit, dec!(17.50));
    }

    #[test]
    fn test_formula_parse_and_errors() {
        let f = NetProfitFormula::parse("sales=1, offering=1, expense=-1").unwrap();
        assert_eq!(f.coefficient(Category::Offering), dec!(1));
        assert_eq!(f.coefficient(Category::Reimbursement), dec!(0));

        assert!(NetProfitFormula::parse("sales").is_err());
        assert!(NetProfitFormula::parse("tips=1").is_err());
        assert!(NetProfitFormula::parse("sales=lots").is_err());
        assert_eq!(NetProfitFormula::parse("").unwrap(), NetProfitFormula::zero());
    }

    #[test]
    fn test_summary_serializes_flat_rows() {
        let entries = vec![entry(1, "2024-03-01", "a", None, Category::Sales, dec!(1.50))];
        let summary = aggregate(&entries, &DateRange::unbounded(), &NetProfitFormula::default());
        let json = serde_json::to_value(&summary).unwrap();
        let row = &json["rows"][0];
        assert_eq!(row["entry_date"], "2024-03-01");
        assert_eq!(row["created_by"], "a");
        assert_eq!(row["label"], "");
        assert_eq!(row["sales"], "1.50");
    }
}
