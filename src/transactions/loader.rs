//! Transactions CSV loading
//!
//! Expected columns: `category` and `amount`, optional `date`. The Portuguese
//! headers `categoria`, `valor` and `data` are accepted as well.

use crate::error::AssistantError;
use crate::transactions::{Transaction, TransactionSet};
use crate::Result;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const DATE_COLUMNS: &[&str] = &["date", "data"];
const CATEGORY_COLUMNS: &[&str] = &["category", "categoria"];
const AMOUNT_COLUMNS: &[&str] = &["amount", "valor"];

/// Load a transactions file from disk
pub fn load_transactions(path: impl AsRef<Path>) -> Result<TransactionSet> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            AssistantError::NotFound(format!("transactions file '{}'", path.display()))
        }
        _ => AssistantError::IoError(e),
    })?;

    let set = parse_transactions(file)?;
    info!(
        path = %path.display(),
        records = set.records.len(),
        dated = set.has_dates,
        "Loaded transactions"
    );
    Ok(set)
}

/// Parse delimited transaction records from any reader
pub fn parse_transactions<R: Read>(reader: R) -> Result<TransactionSet> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();

    let category_idx = find_column(&headers, CATEGORY_COLUMNS);
    let amount_idx = find_column(&headers, AMOUNT_COLUMNS);
    let (Some(category_idx), Some(amount_idx)) = (category_idx, amount_idx) else {
        return Err(AssistantError::Schema(
            "transactions file needs 'category' and 'amount' columns".to_string(),
        ));
    };
    let date_idx = find_column(&headers, DATE_COLUMNS);

    let mut records = Vec::new();

    for (idx, row) in rdr.records().enumerate() {
        let row = row?;
        let line = idx + 2;

        let category = row.get(category_idx).unwrap_or_default();
        if category.is_empty() {
            debug!(line, "Skipping transaction without category");
            continue;
        }

        let raw_amount = row.get(amount_idx).unwrap_or_default();
        if raw_amount.is_empty() {
            debug!(line, "Skipping transaction without amount");
            continue;
        }
        let amount = parse_amount(raw_amount).ok_or_else(|| {
            AssistantError::Schema(format!(
                "line {}: amount '{}' is not numeric",
                line, raw_amount
            ))
        })?;

        let date = date_idx
            .and_then(|i| row.get(i))
            .and_then(parse_date);

        records.push(Transaction {
            date,
            category: category.to_string(),
            amount,
        });
    }

    Ok(TransactionSet {
        records,
        has_dates: date_idx.is_some(),
    })
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.eq_ignore_ascii_case(name)))
}

/// Plain or scientific decimal notation; `inf` and `NaN` are rejected
fn parse_amount(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Calendar date from `YYYY-MM-DD`, ignoring any time suffix
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
