// Import module - broker statement readers (strict, header-validated)

pub mod equity_awards;
pub mod file_detector;
pub mod schwab;
pub mod sheet;

use anyhow::{anyhow, Result};
use calamine::Data;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::ConvertError;
use crate::utils::cell_text;

pub use equity_awards::LapseRecord;
pub use file_detector::SourceKind;
pub use schwab::{Action, RawRecord, StatementRecords};

/// Supported broker statement formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Charles Schwab brokerage "Transactions" export
    Schwab,
}

impl Format {
    pub fn all() -> &'static [Format] {
        &[Format::Schwab]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Schwab => "schwab",
        }
    }

    /// Exact header row of the statement
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Format::Schwab => schwab::HEADER,
        }
    }

    /// Fiat currency every amount in the statement is denominated in
    pub fn currency(&self) -> &'static str {
        match self {
            Format::Schwab => "USD",
        }
    }

    /// Exchange label used in the From/To columns of the output
    pub fn exchange(&self) -> &'static str {
        match self {
            Format::Schwab => "Schwab",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::all()
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| {
                ConvertError::UnsupportedFormat(format!(
                    "unknown format '{}'. Supported formats: {}",
                    s,
                    Format::all()
                        .iter()
                        .map(|f| f.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Open a broker statement, validating its header before any row is read
///
/// When `format` is `None` the format is sniffed from the header row.
pub fn open_statement<P: AsRef<Path>>(path: P, format: Option<Format>) -> Result<StatementRecords> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(anyhow!(ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file {} does not exist", path.display()),
        ))));
    }

    let kind = file_detector::detect_source_kind(path)?;
    let format = match format {
        Some(format) => format,
        None => file_detector::detect_format(path, kind)?,
    };

    info!("Importing {} statement: {:?} ({:?})", format, path, kind);

    match format {
        Format::Schwab => schwab::open(path, kind),
    }
}

/// Compare a header row column-for-column with the expected schema.
///
/// Missing columns are reported first, by name, since that is the most
/// common way an export drifts; then unexpected and reordered columns.
pub(crate) fn validate_header(file: &str, expected: &[&str], cells: &[Data]) -> Result<(), ConvertError> {
    let actual = header_names(cells);

    if let Some(missing) = expected.iter().find(|name| !actual.iter().any(|a| a == *name)) {
        return Err(ConvertError::format_mismatch(
            file,
            format!("missing column '{}'", missing),
        ));
    }

    if let Some(extra) = actual.iter().find(|a| !expected.contains(&a.as_str())) {
        return Err(ConvertError::format_mismatch(
            file,
            format!("unexpected column '{}'", extra),
        ));
    }

    if actual.len() != expected.len() {
        return Err(ConvertError::format_mismatch(
            file,
            format!("expected {} columns, found {}", expected.len(), actual.len()),
        ));
    }

    for (idx, (found, wanted)) in actual.iter().zip(expected).enumerate() {
        if found != wanted {
            return Err(ConvertError::format_mismatch(
                file,
                format!(
                    "column {} is '{}', expected '{}'",
                    idx + 1,
                    found,
                    wanted
                ),
            ));
        }
    }

    Ok(())
}

/// Bring a data row to exactly `width` cells.
///
/// Trailing blank cells beyond the schema are tolerated (trailing delimiters,
/// worksheet padding); short rows and extra values are format errors.
pub(crate) fn fit_row(file: &str, row: usize, width: usize, mut cells: Vec<Data>) -> Result<Vec<Data>, ConvertError> {
    let used = trim_trailing_empty(&cells).len();
    let found = if used > width { used } else { cells.len() };
    if used > width || cells.len() < width {
        return Err(ConvertError::format_mismatch(
            file,
            format!("row {} has {} cells, expected {}", row, found, width),
        ));
    }

    cells.truncate(width);
    Ok(cells)
}

/// Header cells as written, untrimmed, without trailing blank cells
pub(crate) fn header_names(cells: &[Data]) -> Vec<String> {
    trim_trailing_empty(cells)
        .iter()
        .map(|cell| match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

fn trim_trailing_empty(cells: &[Data]) -> &[Data] {
    let used = cells
        .iter()
        .rposition(|cell| cell_text(cell).is_some())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &cells[..used]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<Data> {
        values.iter().map(|v| Data::String(v.to_string())).collect()
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("schwab".parse::<Format>().unwrap(), Format::Schwab);
        assert_eq!("Schwab".parse::<Format>().unwrap(), Format::Schwab);
        assert!(matches!(
            "etoro".parse::<Format>(),
            Err(ConvertError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_validate_header_exact_match() {
        assert!(validate_header("f", &["A", "B"], &cells(&["A", "B"])).is_ok());
        // trailing delimiter
        let mut with_blank = cells(&["A", "B"]);
        with_blank.push(Data::Empty);
        assert!(validate_header("f", &["A", "B"], &with_blank).is_ok());
    }

    #[test]
    fn test_validate_header_names_missing_column() {
        let err = validate_header("f", &["A", "B", "C"], &cells(&["A", "C"])).unwrap_err();
        assert_eq!(err.to_string(), "format mismatch in f: missing column 'B'");
    }

    #[test]
    fn test_validate_header_unexpected_and_reordered() {
        let err = validate_header("f", &["A", "B"], &cells(&["A", "B", "X"])).unwrap_err();
        assert!(err.to_string().contains("unexpected column 'X'"));

        let err = validate_header("f", &["A", "B"], &cells(&["B", "A"])).unwrap_err();
        assert!(err.to_string().contains("column 1 is 'B', expected 'A'"));
    }

    #[test]
    fn test_validate_header_is_case_sensitive() {
        let err = validate_header("f", &["Amount"], &cells(&["amount"])).unwrap_err();
        assert!(err.to_string().contains("missing column 'Amount'"));
    }

    #[test]
    fn test_validate_header_rejects_padded_names() {
        let err = validate_header("f", &["Date", "Amount"], &cells(&["Date ", "Amount"])).unwrap_err();
        assert_eq!(err.to_string(), "format mismatch in f: missing column 'Date'");

        let err = validate_header("f", &["Date", "Amount"], &cells(&["Date", " Amount"])).unwrap_err();
        assert!(err.to_string().contains("missing column 'Amount'"));
    }

    #[test]
    fn test_fit_row_trims_padding_and_rejects_bad_width() {
        let err = fit_row("f", 2, 3, cells(&["a"])).unwrap_err();
        assert!(err.to_string().contains("row 2 has 1 cells, expected 3"));

        let mut padded = cells(&["a", "b"]);
        padded.push(Data::Empty);
        padded.push(Data::Empty);
        assert_eq!(fit_row("f", 2, 2, padded).unwrap().len(), 2);

        let err = fit_row("f", 5, 2, cells(&["a", "b", "c"])).unwrap_err();
        assert!(err.to_string().contains("row 5 has 3 cells, expected 2"));
    }
}
