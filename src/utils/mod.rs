//! Cell parsing utilities shared by the statement importers
//!
//! Both CSV and spreadsheet sources are normalized to calamine `Data` cells,
//! so every importer reads values through the same strict helpers. None of
//! them coerce: a value that does not fit the expected grammar is an error.

use calamine::Data;
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// US date as exported by the broker, optionally followed by an "as of" date
static US_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}/\d{2}/\d{4})(?: as of \d{2}/\d{2}/\d{4})?$").expect("valid date regex")
});

/// Money or plain number: optional sign, optional dollar sign, thousands separators
static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?\$?((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)$").expect("valid money regex")
});

/// Text content of a cell, trimmed. Empty cells and blank strings are `None`.
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        other => Some(other.to_string()),
    }
}

/// Parse a decimal from a cell.
///
/// Spreadsheet numbers are converted through their shortest decimal
/// representation, so `150.25` stays `150.25` instead of picking up binary
/// float noise. Text cells go through [`parse_money`].
pub fn cell_decimal(cell: &Data) -> Result<Option<Decimal>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some(Decimal::from(*i))),
        Data::Float(f) => Decimal::from_str(&f.to_string())
            .map(Some)
            .map_err(|_| format!("number {} is out of range", f)),
        Data::String(s) if s.trim().is_empty() => Ok(None),
        Data::String(s) => parse_money(s).map(Some),
        other => Err(format!("expected a number, found {:?}", other)),
    }
}

/// Smallest scale of a money amount read from a numeric spreadsheet cell
const MONEY_SCALE: u32 = 2;

/// Parse a money amount from a cell.
///
/// Numeric cells lose the cents the sheet displays (`150.00` is stored as
/// `150`), so they are given at least two decimal places, which is how the
/// CSV export writes the same amount. Text cells keep the scale they show.
pub fn cell_money(cell: &Data) -> Result<Option<Decimal>, String> {
    let value = cell_decimal(cell)?;
    Ok(match (cell, value) {
        (Data::Int(_) | Data::Float(_), Some(mut value)) if value.scale() < MONEY_SCALE => {
            value.rescale(MONEY_SCALE);
            Some(value)
        }
        (_, value) => value,
    })
}

/// Parse a date from a cell (native spreadsheet date or US formatted text)
pub fn cell_date(cell: &Data) -> Result<Option<NaiveDate>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::DateTime(dt) => {
            let days_since_epoch = dt.as_f64().floor() as i64;
            let excel_epoch =
                NaiveDate::from_ymd_opt(1899, 12, 30).ok_or_else(|| "invalid Excel epoch".to_string())?;
            excel_epoch
                .checked_add_signed(Duration::days(days_since_epoch))
                .map(Some)
                .ok_or_else(|| "date overflow".to_string())
        }
        Data::DateTimeIso(s) => {
            let date_part = s.split('T').next().unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| format!("could not parse ISO date '{}'", s))
        }
        Data::String(s) if s.trim().is_empty() => Ok(None),
        Data::String(s) => parse_us_date(s).map(Some),
        other => Err(format!("expected a date, found {:?}", other)),
    }
}

/// Parse `MM/DD/YYYY` or `MM/DD/YYYY as of MM/DD/YYYY` (posting date wins)
pub fn parse_us_date(text: &str) -> Result<NaiveDate, String> {
    let text = text.trim();
    let captures = US_DATE
        .captures(text)
        .ok_or_else(|| format!("expected MM/DD/YYYY, found '{}'", text))?;

    NaiveDate::parse_from_str(&captures[1], "%m/%d/%Y")
        .map_err(|_| format!("'{}' is not a valid calendar date", &captures[1]))
}

/// Parse a broker money string such as `-$1,234.56`, `$0.65` or `10`
pub fn parse_money(text: &str) -> Result<Decimal, String> {
    let text = text.trim();
    let captures = MONEY
        .captures(text)
        .ok_or_else(|| format!("expected a number, found '{}'", text))?;

    let digits = captures[2].replace(',', "");
    let value = Decimal::from_str(&digits).map_err(|e| format!("invalid number '{}': {}", text, e))?;

    if captures.get(1).is_some() {
        Ok(-value)
    } else {
        Ok(value)
    }
}
