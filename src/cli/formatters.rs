//! Output formatting module for CLI display
//!
//! Conversion itself never prints; everything the user sees on stdout is
//! rendered here from a finished [`ConversionReport`].

use colored::Colorize;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::convert::ConversionReport;
use crate::importers::Format;
use crate::output::TIMESTAMP_FORMAT;

const PREVIEW_ROWS: usize = 10;

/// Format a conversion report for JSON output
pub fn format_conversion_json(report: &ConversionReport) -> String {
    #[derive(Serialize)]
    struct JsonHolding {
        asset: String,
        quantity: String,
    }

    #[derive(Serialize)]
    struct JsonReport {
        format: String,
        input: String,
        output: Option<String>,
        dry_run: bool,
        source_records: usize,
        rows: usize,
        rows_by_type: std::collections::BTreeMap<String, usize>,
        holdings: Vec<JsonHolding>,
    }

    let json_report = JsonReport {
        format: report.format.name().to_string(),
        input: report.input.display().to_string(),
        output: report.output.as_ref().map(|p| p.display().to_string()),
        dry_run: report.output.is_none(),
        source_records: report.source_records,
        rows: report.rows.len(),
        rows_by_type: report
            .counts()
            .into_iter()
            .map(|(output_type, count)| (output_type.as_str().to_string(), count))
            .collect(),
        holdings: report
            .holdings
            .iter()
            .map(|(asset, quantity)| JsonHolding {
                asset: asset.to_string(),
                quantity: quantity.normalize().to_string(),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&json_report)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format a conversion report for terminal output
pub fn format_conversion_table(report: &ConversionReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n{} Converted {} records from {} into {} rows\n\n",
        "✓".green().bold(),
        report.source_records,
        report.format.name().bold(),
        report.rows.len()
    ));

    #[derive(Tabled)]
    struct PreviewRow {
        #[tabled(rename = "Timestamp")]
        timestamp: String,
        #[tabled(rename = "Type")]
        output_type: String,
        #[tabled(rename = "Base")]
        base: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Quote")]
        quote: String,
        #[tabled(rename = "Route")]
        route: String,
    }

    if !report.rows.is_empty() {
        let preview: Vec<PreviewRow> = report
            .rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| PreviewRow {
                timestamp: row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                output_type: row.output_type.as_str().to_string(),
                base: row.base_currency.clone(),
                amount: row.base_amount.to_string(),
                quote: match (&row.quote_currency, row.quote_amount) {
                    (Some(currency), Some(amount)) => format!("{} {}", amount, currency),
                    _ => String::new(),
                },
                route: match (&row.from, &row.to) {
                    (Some(from), Some(to)) => format!("{} → {}", from, to),
                    _ => String::new(),
                },
            })
            .collect();

        let mut table = Table::new(&preview);
        table.with(Style::rounded());
        table.modify(Columns::new(3..5), Alignment::right());
        output.push_str(&table.to_string());
        output.push('\n');

        if report.rows.len() > PREVIEW_ROWS {
            output.push_str(&format!("\n... and {} more rows\n", report.rows.len() - PREVIEW_ROWS));
        }
    }

    output.push_str(&format!("\n{} Summary", "━".repeat(60).bright_black()));
    for (output_type, count) in report.counts() {
        output.push_str(&format!("\n  {:<18} {}", format!("{}:", output_type.as_str()).bold(), count));
    }

    if !report.holdings.is_empty() {
        output.push_str(&format!("\n\n{}", "Holdings at end of statement:".bold()));
        for (asset, quantity) in &report.holdings {
            output.push_str(&format!("\n  {:<18} {}", asset.as_str(), quantity.normalize()));
        }
    }

    match &report.output {
        Some(path) => output.push_str(&format!(
            "\n\n{} Wrote {}\n",
            "✓".green().bold(),
            path.display()
        )),
        None => output.push_str(&format!("\n\n{} Dry run - no file written\n", "ℹ".blue().bold())),
    }

    output
}

/// Supported formats for JSON output
pub fn format_formats_json() -> String {
    #[derive(Serialize)]
    struct JsonFormat {
        name: &'static str,
        exchange: &'static str,
        currency: &'static str,
        header: &'static [&'static str],
    }

    let formats: Vec<JsonFormat> = Format::all()
        .iter()
        .map(|f| JsonFormat {
            name: f.name(),
            exchange: f.exchange(),
            currency: f.currency(),
            header: f.header(),
        })
        .collect();

    serde_json::to_string_pretty(&formats)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Supported formats as a terminal table
pub fn format_formats_table() -> String {
    #[derive(Tabled)]
    struct FormatRow {
        #[tabled(rename = "Format")]
        name: String,
        #[tabled(rename = "Exchange")]
        exchange: &'static str,
        #[tabled(rename = "Currency")]
        currency: &'static str,
        #[tabled(rename = "Header")]
        header: String,
    }

    let rows: Vec<FormatRow> = Format::all()
        .iter()
        .map(|f| FormatRow {
            name: f.name().bold().to_string(),
            exchange: f.exchange(),
            currency: f.currency(),
            header: f.header().join(", "),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    format!("{}\n", table)
}

/// Render an error for standard error
pub fn format_error(err: &anyhow::Error) -> String {
    format!("{} {:#}", "✗".red().bold(), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SymbolMap;
    use crate::output::{OutputRow, OutputType};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn report() -> ConversionReport {
        let ts = NaiveDate::from_ymd_opt(2023, 1, 5)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        ConversionReport {
            format: Format::Schwab,
            input: PathBuf::from("in.csv"),
            output: None,
            source_records: 1,
            rows: vec![
                OutputRow::new(ts, OutputType::Buy, "AAPL:STOCK", dec!(10)).with_quote("USD", dec!(1500)),
                OutputRow::new(ts, OutputType::Fee, "USD", dec!(1.5)),
            ],
            holdings: vec![(SymbolMap::default().resolve("AAPL"), dec!(10))],
        }
    }

    #[test]
    fn test_json_report() {
        let value: serde_json::Value = serde_json::from_str(&format_conversion_json(&report())).unwrap();
        assert_eq!(value["format"], "schwab");
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["rows"], 2);
        assert_eq!(value["rows_by_type"]["buy"], 1);
        assert_eq!(value["holdings"][0]["asset"], "AAPL:STOCK");
    }

    #[test]
    fn test_table_report_mentions_dry_run() {
        colored::control::set_override(false);
        let text = format_conversion_table(&report());
        assert!(text.contains("AAPL:STOCK"));
        assert!(text.contains("Dry run"));
    }

    #[test]
    fn test_formats_json_lists_schwab() {
        let value: serde_json::Value = serde_json::from_str(&format_formats_json()).unwrap();
        assert_eq!(value[0]["name"], "schwab");
        assert_eq!(value[0]["header"][6], "Fees & Comm");
    }
}
