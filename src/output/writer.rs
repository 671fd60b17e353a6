use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::OutputRow;

/// Fixed header of the Advanced Manual CSV import
pub const HEADER: &[&str] = &[
    "Timestamp (UTC)",
    "Type",
    "Base Currency",
    "Base Amount",
    "Quote Currency (Optional)",
    "Quote Amount (Optional)",
    "Fee Currency (Optional)",
    "Fee Amount (Optional)",
    "From (Optional)",
    "To (Optional)",
    "ID (Optional)",
    "Description (Optional)",
    "Reference Price Per Unit (Optional)",
    "Reference Price Currency (Optional)",
];

/// Serialize rows to CSV bytes: header first, then rows in the given order
pub fn to_csv_bytes(rows: &[OutputRow]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(HEADER).context("Failed to write CSV header")?;
    for row in rows {
        writer.serialize(row).context("Failed to serialize output row")?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e.error()))
}

/// Write rows to `path` atomically.
///
/// The CSV is written to a sibling temporary file and renamed into place, so
/// the destination either receives the complete file or is left untouched.
pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[OutputRow]) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_csv_bytes(rows)?;

    let tmp_path = tmp_path_for(path);
    debug!("Writing {} bytes to {:?}", bytes.len(), tmp_path);

    let written = fs::write(&tmp_path, &bytes)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))
        .and_then(|_| {
            fs::rename(&tmp_path, path)
                .with_context(|| format!("Failed to finalize output file {}", path.display()))
        });

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written?;

    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.csv".to_string());
    path.with_file_name(format!(".{}.tmp", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_rows() -> Vec<OutputRow> {
        let ts = NaiveDate::from_ymd_opt(2023, 1, 5)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        vec![
            OutputRow::new(ts, OutputType::Buy, "AAPL:STOCK", dec!(10))
                .with_quote("USD", dec!(1500.00))
                .with_route("Schwab", "Schwab")
                .with_description("APPLE INC")
                .with_reference_price(dec!(150.00), "USD"),
            OutputRow::new(ts, OutputType::Fee, "USD", dec!(1.50)).with_route("Schwab", "Schwab"),
        ]
    }

    #[test]
    fn test_csv_layout() {
        let text = String::from_utf8(to_csv_bytes(&sample_rows()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(
            lines[1],
            "2023-01-05 01:00:00,buy,AAPL:STOCK,10,USD,1500.00,,,Schwab,Schwab,,APPLE INC,150.00,USD"
        );
        assert_eq!(lines[2], "2023-01-05 01:00:00,fee,USD,1.50,,,,,Schwab,Schwab,,,,");
    }

    #[test]
    fn test_header_written_without_rows() {
        let text = String::from_utf8(to_csv_bytes(&[]).unwrap()).unwrap();
        assert_eq!(text, format!("{}\n", HEADER.join(",")));
    }

    #[test]
    fn test_write_csv_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        fs::write(&target, "stale").unwrap();

        write_csv(&target, &sample_rows()).unwrap();

        let text = fs::read_to_string(&target).unwrap();
        assert!(text.starts_with("Timestamp (UTC),Type,"));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_csv_failure_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing-dir").join("out.csv");

        assert!(write_csv(&target, &sample_rows()).is_err());
        assert!(!target.exists());
    }
}
