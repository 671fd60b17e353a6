//! Error handling for ctc-stocks
//!
//! Defines the conversion error taxonomy and establishes a unified Result type
//! using anyhow for context chaining and error propagation. Every variant is
//! fatal: the run aborts and no output file is written.

use rust_decimal::Decimal;
use thiserror::Error;

/// Core error types for statement conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("format mismatch in {file}: {reason}")]
    FormatMismatch { file: String, reason: String },

    #[error("row {row}, column '{column}': {reason} (value: '{value}')")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    #[error("row {row}: transaction type '{label}' {detail}")]
    UnknownTransactionType {
        row: usize,
        label: String,
        detail: &'static str,
    },

    #[error("row {row}: selling {requested} {asset} but only {held} held")]
    LedgerViolation {
        row: usize,
        asset: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("row {row}: {reason}")]
    MissingSource { row: usize, reason: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn invalid_cell(
        row: usize,
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConvertError::InvalidCell {
            row,
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn format_mismatch(file: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::FormatMismatch {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for conversion operations
pub type Result<T> = anyhow::Result<T>;
