//! Charles Schwab brokerage "Transactions" export
//!
//! The export is a flat table with one row per account event:
//!
//! | Date | Action | Symbol | Description | Quantity | Price | Fees & Comm | Amount |
//! |------|--------|--------|-------------|----------|-------|-------------|--------|
//! | 01/05/2023 | Buy | AAPL | APPLE INC | 10 | $150.00 | $1.50 | -$1,501.50 |
//!
//! Dates have no time of day and may carry an "as of" suffix. Amounts are
//! signed from the account's point of view (money out is negative). The
//! export ends with a `Transactions Total` summary row.
//!
//! The reader is strict: the header must match exactly, every action label
//! must be known, and every field an action needs must be present and
//! well-formed. The first problem aborts the import.

use anyhow::Result;
use calamine::Data;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info};

use super::sheet::SheetRows;
use super::{fit_row, validate_header, Format, SourceKind};
use crate::error::ConvertError;
use crate::utils::{cell_date, cell_decimal, cell_money, cell_text};

/// Exact header of the export
pub const HEADER: &[&str] = &[
    "Date",
    "Action",
    "Symbol",
    "Description",
    "Quantity",
    "Price",
    "Fees & Comm",
    "Amount",
];

const COL_DATE: usize = 0;
const COL_ACTION: usize = 1;
const COL_SYMBOL: usize = 2;
const COL_DESCRIPTION: usize = 3;
const COL_QUANTITY: usize = 4;
const COL_PRICE: usize = 5;
const COL_FEES: usize = 6;
const COL_AMOUNT: usize = 7;

/// First cell of the summary row closing the export
const TOTAL_ROW_LABEL: &str = "Transactions Total";

/// Action labels the export is known to contain but that have no mapping to
/// the destination vocabulary yet (corporate actions, options, reinvestments).
pub const UNMAPPED_LABELS: &[&str] = &[
    "Stock Split",
    "Reverse Split",
    "Stock Merger",
    "Spin-off",
    "Cash In Lieu",
    "Reinvest Shares",
    "Reinvest Dividend",
    "Journal",
    "Journaled Shares",
    "Security Transfer",
    "Buy to Open",
    "Buy to Close",
    "Sell to Open",
    "Sell to Close",
    "Expired",
    "Assigned",
    "Exchange or Exercise",
    "Foreign Tax Paid",
    "NRA Tax Adj",
];

/// Transaction type of a statement row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Fee,
    Dividend,
    Interest,
    Deposit,
    Withdrawal,
    /// Bank link transfer, direction given by the sign of the amount
    Transfer,
    /// Shares deposited from an equity award; detailed in the awards export
    StockPlanActivity,
    /// Known label without a defined mapping
    Unmapped,
}

impl Action {
    /// Classify an action label. Unknown labels return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let action = match label {
            "Buy" => Action::Buy,
            "Sell" => Action::Sell,
            "Service Fee" | "ADR Mgmt Fee" => Action::Fee,
            "Qualified Dividend" | "Cash Dividend" | "Non-Qualified Div" | "Pr Yr Cash Div" => {
                Action::Dividend
            }
            "Credit Interest" | "Bank Interest" => Action::Interest,
            "Wire Received" | "MoneyLink Deposit" => Action::Deposit,
            "Wire Sent" => Action::Withdrawal,
            "MoneyLink Transfer" => Action::Transfer,
            "Stock Plan Activity" => Action::StockPlanActivity,
            other if UNMAPPED_LABELS.contains(&other) => Action::Unmapped,
            _ => return None,
        };
        Some(action)
    }

    /// Columns that must hold a value for this action
    fn required_columns(&self) -> &'static [usize] {
        match self {
            Action::Buy | Action::Sell => &[COL_SYMBOL, COL_QUANTITY, COL_PRICE, COL_AMOUNT],
            Action::Dividend => &[COL_SYMBOL, COL_AMOUNT],
            Action::StockPlanActivity => &[COL_SYMBOL, COL_QUANTITY],
            Action::Fee
            | Action::Interest
            | Action::Deposit
            | Action::Withdrawal
            | Action::Transfer => &[COL_AMOUNT],
            Action::Unmapped => &[],
        }
    }

    /// Columns beyond Date, Action and Description that may hold a value
    fn permitted_columns(&self) -> &'static [usize] {
        match self {
            Action::Buy | Action::Sell => &[COL_SYMBOL, COL_QUANTITY, COL_PRICE, COL_FEES, COL_AMOUNT],
            Action::Dividend | Action::Fee => &[COL_SYMBOL, COL_AMOUNT],
            Action::StockPlanActivity => &[COL_SYMBOL, COL_QUANTITY],
            Action::Interest | Action::Deposit | Action::Withdrawal | Action::Transfer => &[COL_AMOUNT],
            Action::Unmapped => &[COL_SYMBOL, COL_QUANTITY, COL_PRICE, COL_FEES, COL_AMOUNT],
        }
    }
}

/// Columns whose use depends on the action
const ACTION_COLUMNS: &[usize] = &[COL_SYMBOL, COL_QUANTITY, COL_PRICE, COL_FEES, COL_AMOUNT];

/// One validated statement row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based row in the source file
    pub row: usize,
    pub date: NaiveDate,
    pub action: Action,
    /// Action label as written in the file
    pub label: String,
    pub symbol: Option<String>,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub currency: &'static str,
}

impl RawRecord {
    pub fn symbol(&self) -> Result<&str, ConvertError> {
        self.symbol
            .as_deref()
            .ok_or_else(|| self.missing(HEADER[COL_SYMBOL]))
    }

    pub fn quantity(&self) -> Result<Decimal, ConvertError> {
        self.quantity.ok_or_else(|| self.missing(HEADER[COL_QUANTITY]))
    }

    pub fn price(&self) -> Result<Decimal, ConvertError> {
        self.price.ok_or_else(|| self.missing(HEADER[COL_PRICE]))
    }

    pub fn amount(&self) -> Result<Decimal, ConvertError> {
        self.amount.ok_or_else(|| self.missing(HEADER[COL_AMOUNT]))
    }

    /// Fees and commissions, zero when the cell is blank
    pub fn fees(&self) -> Decimal {
        self.fees.unwrap_or(Decimal::ZERO)
    }

    fn missing(&self, column: &str) -> ConvertError {
        ConvertError::invalid_cell(
            self.row,
            column,
            "",
            format!("value required for '{}'", self.label),
        )
    }
}

/// Lazy sequence of statement records in file order
///
/// Stops at the first error; once an error has been returned the iterator
/// is exhausted.
pub struct StatementRecords {
    file: String,
    rows: SheetRows,
    format: Format,
    currency: &'static str,
    done: bool,
}

/// Open a Schwab statement and validate its header
pub fn open(path: &Path, kind: SourceKind) -> Result<StatementRecords> {
    let file = path.display().to_string();
    let mut rows = SheetRows::open(path, kind)?;

    let (_, header) = rows
        .next()
        .ok_or_else(|| ConvertError::format_mismatch(&file, "file is empty, expected a header row"))??;
    validate_header(&file, HEADER, &header)?;
    debug!("Header of {} matches the Schwab schema", file);

    Ok(StatementRecords {
        file,
        rows,
        format: Format::Schwab,
        currency: Format::Schwab.currency(),
        done: false,
    })
}

impl StatementRecords {
    pub fn format(&self) -> Format {
        self.format
    }

    fn parse_row(&self, row: usize, cells: Vec<Data>) -> Result<RawRecord, ConvertError> {
        let cells = fit_row(&self.file, row, HEADER.len(), cells)?;

        let label = cell_text(&cells[COL_ACTION])
            .ok_or_else(|| ConvertError::invalid_cell(row, HEADER[COL_ACTION], "", "action is empty"))?;
        let action = Action::from_label(&label).ok_or_else(|| ConvertError::UnknownTransactionType {
            row,
            label: label.clone(),
            detail: "is not a recognized action",
        })?;

        for &col in action.required_columns() {
            if cell_text(&cells[col]).is_none() {
                return Err(ConvertError::invalid_cell(
                    row,
                    HEADER[col],
                    "",
                    format!("value required for '{}'", label),
                ));
            }
        }

        for &col in ACTION_COLUMNS {
            if action.permitted_columns().contains(&col) {
                continue;
            }
            if let Some(value) = cell_text(&cells[col]) {
                return Err(ConvertError::invalid_cell(
                    row,
                    HEADER[col],
                    value,
                    format!("'{}' rows carry no {}", label, HEADER[col]),
                ));
            }
        }

        let date = cell_date(&cells[COL_DATE])
            .map_err(|reason| invalid(row, COL_DATE, &cells[COL_DATE], reason))?
            .ok_or_else(|| ConvertError::invalid_cell(row, HEADER[COL_DATE], "", "date is empty"))?;

        let decimal = |col: usize| {
            cell_decimal(&cells[col]).map_err(|reason| invalid(row, col, &cells[col], reason))
        };
        let money = |col: usize| {
            cell_money(&cells[col]).map_err(|reason| invalid(row, col, &cells[col], reason))
        };

        Ok(RawRecord {
            row,
            date,
            action,
            symbol: cell_text(&cells[COL_SYMBOL]),
            description: cell_text(&cells[COL_DESCRIPTION]).unwrap_or_default(),
            quantity: decimal(COL_QUANTITY)?,
            price: money(COL_PRICE)?,
            fees: money(COL_FEES)?,
            amount: money(COL_AMOUNT)?,
            currency: self.currency,
            label,
        })
    }

    /// Everything after the total row must be blank
    fn check_trailer(&mut self) -> Result<(), ConvertError> {
        for next in self.rows.by_ref() {
            let (row, cells) = next.map_err(|e| ConvertError::format_mismatch(&self.file, format!("{:#}", e)))?;
            if cells.iter().any(|cell| cell_text(cell).is_some()) {
                return Err(ConvertError::format_mismatch(
                    &self.file,
                    format!("row {} follows the '{}' row", row, TOTAL_ROW_LABEL),
                ));
            }
        }
        Ok(())
    }
}

impl Iterator for StatementRecords {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let (row, cells) = match self.rows.next() {
                Some(Ok(next)) => next,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            // Blank lines carry no information
            if cells.iter().all(|cell| cell_text(cell).is_none()) {
                continue;
            }

            if cells.first().and_then(cell_text).as_deref() == Some(TOTAL_ROW_LABEL) {
                self.done = true;
                info!("Reached '{}' at row {}", TOTAL_ROW_LABEL, row);
                return match self.check_trailer() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e.into())),
                };
            }

            let parsed = self.parse_row(row, cells);
            if parsed.is_err() {
                self.done = true;
            }
            return Some(parsed.map_err(Into::into));
        }
    }
}

fn invalid(row: usize, col: usize, cell: &Data, reason: String) -> ConvertError {
    ConvertError::invalid_cell(row, HEADER[col], cell_text(cell).unwrap_or_default(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const HEADER_LINE: &str =
        "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Price\",\"Fees & Comm\",\"Amount\"";

    fn statement(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "{}", HEADER_LINE).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn read_all(file: &tempfile::NamedTempFile) -> Result<Vec<RawRecord>> {
        open(file.path(), SourceKind::Csv)?.collect()
    }

    fn convert_error(err: &anyhow::Error) -> &ConvertError {
        err.downcast_ref::<ConvertError>().expect("typed error")
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(Action::from_label("Buy"), Some(Action::Buy));
        assert_eq!(Action::from_label("Qualified Dividend"), Some(Action::Dividend));
        assert_eq!(Action::from_label("Stock Split"), Some(Action::Unmapped));
        assert_eq!(Action::from_label("buy"), None);
        assert_eq!(Action::from_label("Teleport"), None);
    }

    #[test]
    fn test_parse_buy_row() {
        let file = statement(&[
            "\"01/05/2023\",\"Buy\",\"AAPL\",\"APPLE INC\",\"10\",\"$150.00\",\"$1.50\",\"-$1,501.50\"",
        ]);

        let records = read_all(&file).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.row, 2);
        assert_eq!(record.action, Action::Buy);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
        assert_eq!(record.symbol.as_deref(), Some("AAPL"));
        assert_eq!(record.quantity, Some(dec!(10)));
        assert_eq!(record.price, Some(dec!(150.00)));
        assert_eq!(record.fees(), dec!(1.50));
        assert_eq!(record.amount, Some(dec!(-1501.50)));
        assert_eq!(record.currency, "USD");
    }

    #[test]
    fn test_total_row_ends_data_and_blank_lines_are_skipped() {
        let file = statement(&[
            "\"01/06/2023\",\"Credit Interest\",\"\",\"SCHWAB1 INT\",\"\",\"\",\"\",\"$0.12\"",
            "\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"01/05/2023\",\"Wire Received\",\"\",\"WIRED FUNDS\",\"\",\"\",\"\",\"$5,000.00\"",
            "\"Transactions Total\",\"\",\"\",\"\",\"\",\"\",\"\",\"$5,000.12\"",
        ]);

        let records = read_all(&file).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, Action::Interest);
        assert_eq!(records[1].action, Action::Deposit);
        assert_eq!(records[1].row, 4);
    }

    #[test]
    fn test_rows_after_total_are_rejected() {
        let file = statement(&[
            "\"Transactions Total\",\"\",\"\",\"\",\"\",\"\",\"\",\"$0.00\"",
            "\"01/05/2023\",\"Wire Received\",\"\",\"\",\"\",\"\",\"\",\"$1.00\"",
        ]);

        let err = read_all(&file).unwrap_err();
        assert!(matches!(convert_error(&err), ConvertError::FormatMismatch { .. }));
    }

    #[test]
    fn test_unknown_action_fails_with_row() {
        let file = statement(&[
            "\"01/05/2023\",\"Buy\",\"AAPL\",\"\",\"1\",\"$1.00\",\"\",\"-$1.00\"",
            "\"01/06/2023\",\"Teleport\",\"AAPL\",\"\",\"1\",\"\",\"\",\"\"",
        ]);

        let err = read_all(&file).unwrap_err();
        match convert_error(&err) {
            ConvertError::UnknownTransactionType { row, label, .. } => {
                assert_eq!(*row, 3);
                assert_eq!(label, "Teleport");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field() {
        let file = statement(&["\"01/05/2023\",\"Sell\",\"AAPL\",\"\",\"\",\"$1.00\",\"\",\"$1.00\""]);

        let err = read_all(&file).unwrap_err();
        match convert_error(&err) {
            ConvertError::InvalidCell { row, column, .. } => {
                assert_eq!(*row, 2);
                assert_eq!(column, "Quantity");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_values_in_unused_columns_are_rejected() {
        let file = statement(&["\"01/05/2023\",\"Wire Received\",\"\",\"WIRED FUNDS\",\"5\",\"\",\"\",\"$5.00\""]);
        let err = read_all(&file).unwrap_err();
        match convert_error(&err) {
            ConvertError::InvalidCell { row, column, value, .. } => {
                assert_eq!(*row, 2);
                assert_eq!(column, "Quantity");
                assert_eq!(value, "5");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let file = statement(&["\"01/05/2023\",\"Service Fee\",\"\",\"\",\"\",\"\",\"$1.00\",\"-$1.00\""]);
        let err = read_all(&file).unwrap_err();
        assert!(err.to_string().contains("column 'Fees & Comm'"));
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let file = statement(&["\"01/05/2023\",\"Buy\",\"AAPL\",\"\",\"ten\",\"$1.00\",\"\",\"-$10.00\""]);

        let err = read_all(&file).unwrap_err();
        assert!(err.to_string().contains("column 'Quantity'"));
    }

    #[test]
    fn test_header_missing_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "\"Date\",\"Action\",\"Symbol\",\"Description\",\"Quantity\",\"Fees & Comm\",\"Amount\""
        )
        .unwrap();

        let err = open(file.path(), SourceKind::Csv).err().expect("header must fail");
        assert_eq!(
            convert_error(&err).to_string(),
            format!("format mismatch in {}: missing column 'Price'", file.path().display())
        );
    }

    #[test]
    fn test_short_row_is_format_mismatch() {
        let file = statement(&["\"01/05/2023\",\"Buy\",\"AAPL\""]);
        let err = read_all(&file).unwrap_err();
        assert!(matches!(convert_error(&err), ConvertError::FormatMismatch { .. }));
    }

    #[test]
    fn test_iterator_is_fused_after_error() {
        let file = statement(&[
            "\"bad\",\"Buy\",\"AAPL\",\"\",\"1\",\"$1.00\",\"\",\"-$1.00\"",
            "\"01/05/2023\",\"Buy\",\"AAPL\",\"\",\"1\",\"$1.00\",\"\",\"-$1.00\"",
        ]);

        let mut records = open(file.path(), SourceKind::Csv).unwrap();
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }
}
