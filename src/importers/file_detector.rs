use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::sheet::SheetRows;
use super::{header_names, Format};
use crate::error::ConvertError;

/// Physical container of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Spreadsheet,
}

/// Detect the source kind from the file extension
///
/// - CSV/TXT files → delimited text
/// - XLSX/XLS/XLSM/ODS files → first worksheet of a workbook
pub fn detect_source_kind<P: AsRef<Path>>(path: P) -> Result<SourceKind> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            ConvertError::UnsupportedFormat(format!("{} has no file extension", path.display()))
        })?
        .to_lowercase();

    match extension.as_str() {
        "csv" | "txt" => Ok(SourceKind::Csv),
        "xlsx" | "xls" | "xlsm" | "ods" => Ok(SourceKind::Spreadsheet),
        _ => Err(ConvertError::UnsupportedFormat(format!(
            "unsupported file extension '.{}'. Supported: .csv, .txt, .xlsx, .xls, .xlsm, .ods",
            extension
        ))
        .into()),
    }
}

/// Detect the statement format by comparing the header row with every known schema
///
/// Detection is deliberately shallow: the header must match a known format
/// exactly, otherwise the file is rejected and `--format` has to be given.
pub fn detect_format<P: AsRef<Path>>(path: P, kind: SourceKind) -> Result<Format> {
    let path = path.as_ref();
    let mut rows = SheetRows::open(path, kind)?;

    let header: Vec<String> = match rows.next() {
        Some(row) => {
            let (_, cells) = row.context("Failed to read header row for format detection")?;
            header_names(&cells)
        }
        None => Vec::new(),
    };

    for format in Format::all() {
        if header.iter().map(String::as_str).eq(format.header().iter().copied()) {
            info!("Detected {} format from header", format);
            return Ok(*format);
        }
    }

    let known = Format::all()
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ");

    Err(ConvertError::format_mismatch(
        path.display().to_string(),
        format!(
            "header {:?} does not match any known format (known: {}); pass --format to see the exact mismatch",
            header, known
        ),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_source_kind_by_extension() {
        assert_eq!(detect_source_kind("a.CSV").unwrap(), SourceKind::Csv);
        assert_eq!(detect_source_kind("a.txt").unwrap(), SourceKind::Csv);
        assert_eq!(detect_source_kind("a.xlsx").unwrap(), SourceKind::Spreadsheet);
    }

    #[test]
    fn test_detect_source_kind_rejects_unknown_extension() {
        let err = detect_source_kind("statement.pdf").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConvertError>(),
            Some(ConvertError::UnsupportedFormat(_))
        ));
        assert!(detect_source_kind("statement").is_err());
    }

    #[test]
    fn test_detect_format_from_schwab_header() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Price\",\"Fees & Comm\",\"Amount\""
        )
        .unwrap();

        assert_eq!(
            detect_format(file.path(), SourceKind::Csv).unwrap(),
            Format::Schwab
        );
    }

    #[test]
    fn test_detect_format_requires_exact_header_text() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Price\",\"Fees & Comm\",\"Amount \""
        )
        .unwrap();

        assert!(detect_format(file.path(), SourceKind::Csv).is_err());
    }

    #[test]
    fn test_detect_format_unknown_header() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Trade Date,Ticker,Side").unwrap();

        let err = detect_format(file.path(), SourceKind::Csv).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConvertError>(),
            Some(ConvertError::FormatMismatch { .. })
        ));
    }
}
