//! Tabular row sources
//!
//! CSV files and spreadsheets are exposed through the same lazy iterator of
//! `(row_number, cells)` pairs, with cells normalized to calamine `Data`.
//! Row numbers are 1-based and count the header, so they match what a user
//! sees in a spreadsheet program. Worksheet rows are padded to the width of
//! the used range; trailing blank cells are left for the importer to judge.

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use super::file_detector::SourceKind;

/// A single physical row: 1-based row number and its cells
pub type Row = (usize, Vec<Data>);

/// Lazy, single-pass sequence of rows from a CSV file or a worksheet
pub enum SheetRows {
    Csv {
        records: csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
        next_row: usize,
    },
    Worksheet {
        range: Range<Data>,
        next_row: usize,
    },
}

impl SheetRows {
    /// Open a row source for `path` according to its source kind
    pub fn open(path: &Path, kind: SourceKind) -> Result<Self> {
        match kind {
            SourceKind::Csv => Self::open_csv(path),
            SourceKind::Spreadsheet => Self::open_worksheet(path),
        }
    }

    fn open_csv(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

        // Broker exports are UTF-8, sometimes with a BOM in front of the header
        let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(&bytes);
        if had_errors {
            return Err(anyhow!(
                "{} is not valid UTF-8 text",
                path.display()
            ));
        }

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // row width is validated by the importer, with row context
            .from_reader(Cursor::new(text.into_owned().into_bytes()));

        Ok(SheetRows::Csv {
            records: reader.into_records(),
            next_row: 1,
        })
    }

    fn open_worksheet(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open spreadsheet {}", path.display()))?;

        let sheet_names = workbook.sheet_names();
        debug!("Spreadsheet sheets: {:?}", sheet_names);

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("{} contains no worksheets", path.display()))?
            .context("Failed to read worksheet")?;

        // Rows above the used range are blank; keep numbering aligned with the sheet
        let first_row = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

        Ok(SheetRows::Worksheet {
            range,
            next_row: first_row,
        })
    }
}

impl Iterator for SheetRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SheetRows::Csv { records, next_row } => {
                let record = records.next()?;
                let row_number = *next_row;
                *next_row += 1;

                Some(
                    record
                        .with_context(|| format!("Failed to read CSV row {}", row_number))
                        .map(|record| {
                            let cells = record
                                .iter()
                                .map(|field| {
                                    if field.trim().is_empty() {
                                        Data::Empty
                                    } else {
                                        Data::String(field.to_string())
                                    }
                                })
                                .collect();
                            (row_number, cells)
                        }),
                )
            }
            SheetRows::Worksheet { range, next_row } => {
                let (_, start_col) = range.start()?;
                let (end_row, end_col) = range.end()?;
                let absolute = *next_row - 1;
                if absolute > end_row as usize {
                    return None;
                }

                let cells = (start_col..=end_col)
                    .map(|col| {
                        range
                            .get_value((absolute as u32, col))
                            .cloned()
                            .unwrap_or(Data::Empty)
                    })
                    .collect::<Vec<_>>();

                let row_number = *next_row;
                *next_row += 1;
                Some(Ok((row_number, cells)))
            }
        }
    }
}
