//! Spending aggregation
//!
//! Groups transaction records by category over an optional inclusive date
//! range and renders the result as prompt text.

pub mod loader;

pub use loader::{load_transactions, parse_transactions};

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SPENDING_HEADING: &str = "Resumo de Gastos";

/// A single transaction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: Option<NaiveDate>,
    pub category: String,
    pub amount: Decimal,
}

impl Transaction {
    pub fn new(date: Option<NaiveDate>, category: impl Into<String>, amount: Decimal) -> Self {
        Self {
            date,
            category: category.into(),
            amount,
        }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Both ends included; an inverted range contains nothing
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Fill missing ends from `bounds`
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        bounds: Option<DateRange>,
    ) -> Option<DateRange> {
        match (start, end, bounds) {
            (Some(start), Some(end), _) => Some(DateRange::new(start, end)),
            (Some(start), None, Some(b)) => Some(DateRange::new(start, b.end)),
            (None, Some(end), Some(b)) => Some(DateRange::new(b.start, end)),
            (Some(start), None, None) => Some(DateRange::new(start, NaiveDate::MAX)),
            (None, Some(end), None) => Some(DateRange::new(NaiveDate::MIN, end)),
            (None, None, bounds) => bounds,
        }
    }
}

/// Records loaded from one transactions file
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionSet {
    pub records: Vec<Transaction>,
    /// Whether the file carried a date column at all
    pub has_dates: bool,
}

impl TransactionSet {
    /// Earliest and latest dates present, if any
    pub fn date_bounds(&self) -> Option<DateRange> {
        let mut dates = self.records.iter().filter_map(|t| t.date);
        let first = dates.next()?;
        let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(DateRange::new(start, end))
    }

    /// Aggregate, ignoring the range when the file has no date column
    pub fn summarize(&self, range: Option<DateRange>) -> SpendingSummary {
        let range = if self.has_dates { range } else { None };
        aggregate(&self.records, range)
    }
}

/// Category totals, ordered by category name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpendingSummary {
    totals: BTreeMap<String, Decimal>,
}

impl SpendingSummary {
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn get(&self, category: &str) -> Option<Decimal> {
        self.totals.get(category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.totals.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> Decimal {
        self.totals
            .values()
            .fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// One `<category>: R$<amount>` line per category
    pub fn format(&self) -> String {
        self.totals
            .iter()
            .map(|(category, amount)| format!("{}: R${}", category, format_amount(*amount)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sum amounts per category over records inside `range`
///
/// Undated records are always included.
pub fn aggregate(records: &[Transaction], range: Option<DateRange>) -> SpendingSummary {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();

    for record in records {
        let in_range = match (range, record.date) {
            (Some(range), Some(date)) => range.contains(date),
            _ => true,
        };
        if in_range {
            let total = totals.entry(record.category.clone()).or_insert(Decimal::ZERO);
            *total = total.saturating_add(record.amount);
        }
    }

    SpendingSummary { totals }
}

/// Exactly two decimals, half away from zero
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{:.2}", rounded)
}

/// Append the spending section, or nothing for an empty summary
pub fn append_spending_section(prompt: &str, summary: &SpendingSummary) -> String {
    if summary.is_empty() {
        return prompt.to_string();
    }
    format!("{}\n\n{}:\n{}", prompt, SPENDING_HEADING, summary.format())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 10, d)
    }

    fn amount(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn sample() -> Vec<Transaction> {
        vec![
            Transaction::new(day(1), "moradia", amount("1200.00")),
            Transaction::new(day(3), "alimentacao", amount("450.25")),
            Transaction::new(day(10), "alimentacao", amount("120.50")),
            Transaction::new(day(15), "transporte", amount("80")),
            Transaction::new(day(31), "lazer", amount("200")),
        ]
    }

    #[test]
    fn test_two_decimal_rounding_at_format_time() {
        let records = vec![
            Transaction::new(None, "food", amount("50.00")),
            Transaction::new(None, "food", amount("25.005")),
        ];
        let summary = aggregate(&records, None);

        assert_eq!(summary.len(), 1);
        assert_eq!(summary.get("food"), Some(amount("75.005")));
        assert_eq!(summary.format(), "food: R$75.01");
    }

    #[test]
    fn test_total_is_conserved() {
        let records = sample();
        let summary = aggregate(&records, None);
        let expected: Decimal = records.iter().map(|t| t.amount).sum();

        assert_eq!(summary.total(), expected);
        assert_eq!(summary.len(), 4);
    }

    #[test]
    fn test_range_is_inclusive_and_drops_absent_categories() {
        let range = DateRange::new(day(3).unwrap(), day(15).unwrap());
        let summary = aggregate(&sample(), Some(range));

        assert_eq!(summary.get("alimentacao"), Some(amount("570.75")));
        assert_eq!(summary.get("transporte"), Some(amount("80")));
        assert_eq!(summary.get("moradia"), None);
        assert_eq!(summary.get("lazer"), None);
        assert_eq!(summary.total(), amount("650.75"));
    }

    #[test]
    fn test_empty_and_filtered_out() {
        let empty = aggregate(&[], None);
        assert!(empty.is_empty());
        assert_eq!(empty.format(), "");

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let filtered = aggregate(&sample(), Some(range));
        assert!(filtered.is_empty());
        assert_eq!(filtered.format(), "");
        assert_eq!(append_spending_section("Base.", &filtered), "Base.");
    }

    #[test]
    fn test_range_ignored_without_date_column() {
        let set = TransactionSet {
            records: vec![Transaction::new(None, "food", amount("10"))],
            has_dates: false,
        };
        let range = DateRange::new(day(1).unwrap(), day(2).unwrap());
        assert_eq!(set.summarize(Some(range)).get("food"), Some(amount("10")));
    }

    #[test]
    fn test_date_bounds_and_resolve() {
        let set = TransactionSet {
            records: sample(),
            has_dates: true,
        };
        let bounds = set.date_bounds().unwrap();
        assert_eq!(bounds, DateRange::new(day(1).unwrap(), day(31).unwrap()));

        let resolved = DateRange::resolve(day(10), None, Some(bounds)).unwrap();
        assert_eq!(resolved, DateRange::new(day(10).unwrap(), day(31).unwrap()));
        assert_eq!(DateRange::resolve(None, None, None), None);

        assert_eq!(TransactionSet::default().date_bounds(), None);
    }

    #[test]
    fn test_format_lines_sorted_by_category() {
        let summary = aggregate(&sample(), None);
        assert_eq!(
            summary.format(),
            "alimentacao: R$570.75\nlazer: R$200.00\nmoradia: R$1200.00\ntransporte: R$80.00"
        );
        let prompt = append_spending_section("Base.", &summary);
        assert!(prompt.starts_with("Base.\n\nResumo de Gastos:\nalimentacao: R$570.75"));
    }

    #[test]
    fn test_format_amount_edges() {
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
        assert_eq!(format_amount(amount("-12.5")), "-12.50");
        assert_eq!(format_amount(amount("-0.001")), "0.00");
        assert_eq!(format_amount(amount("1.005")), "1.01");
        assert_eq!(format_amount(amount("-1.005")), "-1.01");
        assert_eq!(format_amount(amount("99.994")), "99.99");
    }

    #[test]
    fn test_very_large_amounts_do_not_overflow() {
        assert_eq!(format_amount(amount("10000000000000")), "10000000000000.00");

        let records = vec![
            Transaction::new(None, "food", Decimal::MAX),
            Transaction::new(None, "food", Decimal::MAX),
            Transaction::new(None, "rent", Decimal::MAX),
        ];
        let summary = aggregate(&records, None);

        assert_eq!(summary.get("food"), Some(Decimal::MAX));
        assert_eq!(summary.total(), Decimal::MAX);
        assert_eq!(summary.format().lines().count(), 2);
    }
}
