//! Schwab "Equity Awards" export (RSU vesting events)
//!
//! Every award spans two physical rows. The first carries the event:
//! date, action, symbol, description and gross quantity. The second carries
//! the award details: award date, fair market value, shares withheld for
//! taxes, net shares deposited and taxes. Only `Lapse` events are supported.

use anyhow::{Context, Result};
use calamine::Data;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::info;

use super::sheet::SheetRows;
use super::{fit_row, validate_header, SourceKind};
use crate::error::ConvertError;
use crate::utils::{cell_date, cell_decimal, cell_text};

/// Exact header of the export
pub const HEADER: &[&str] = &[
    "Date",
    "Action",
    "Symbol",
    "Description",
    "Quantity",
    "FeesAndCommissions",
    "DisbursementElection",
    "Amount",
    "AwardDate",
    "AwardId",
    "FairMarketValuePrice",
    "SalePrice",
    "SharesSoldWithheldForTaxes",
    "NetSharesDeposited",
    "Taxes",
];

const COL_DATE: usize = 0;
const COL_ACTION: usize = 1;
const COL_SYMBOL: usize = 2;
const COL_DESCRIPTION: usize = 3;
const COL_QUANTITY: usize = 4;
const COL_AWARD_DATE: usize = 8;
const COL_FAIR_MARKET_VALUE: usize = 10;
const COL_WITHHELD: usize = 12;
const COL_NET_SHARES: usize = 13;
const COL_TAXES: usize = 14;

const LAPSE: &str = "Lapse";

/// A vested award: shares released into the brokerage account
#[derive(Debug, Clone, PartialEq)]
pub struct LapseRecord {
    /// 1-based row of the event line in the source file
    pub row: usize,
    pub date: NaiveDate,
    pub symbol: String,
    pub description: String,
    pub quantity: Decimal,
    pub award_date: NaiveDate,
    pub fair_market_value: Decimal,
    pub withheld: Decimal,
    pub net_shares: Decimal,
    pub taxes: Option<Decimal>,
}

impl LapseRecord {
    /// Market value of the shares that reached the account
    pub fn deposited_value(&self) -> Result<Decimal, ConvertError> {
        self.fair_market_value.checked_mul(self.net_shares).ok_or_else(|| {
            ConvertError::invalid_cell(
                self.row,
                HEADER[COL_FAIR_MARKET_VALUE],
                self.fair_market_value.to_string(),
                format!("value of {} net shares is out of range", self.net_shares),
            )
        })
    }
}

/// Read every Lapse event from an equity awards export
pub fn read_equity_awards<P: AsRef<Path>>(path: P) -> Result<Vec<LapseRecord>> {
    let path = path.as_ref();
    let file = path.display().to_string();
    info!("Reading equity awards: {:?}", path);

    if super::file_detector::detect_source_kind(path)? != SourceKind::Csv {
        return Err(ConvertError::UnsupportedFormat(format!(
            "equity awards must be a CSV export, got {}",
            file
        ))
        .into());
    }

    let mut rows = SheetRows::open(path, SourceKind::Csv)?;
    let (_, header) = rows
        .next()
        .ok_or_else(|| ConvertError::format_mismatch(&file, "file is empty, expected a header row"))?
        .context("Failed to read equity awards header")?;
    validate_header(&file, HEADER, &header)?;

    let mut lapses = Vec::new();
    let mut pending: Option<(usize, Vec<Data>)> = None;

    for next in rows {
        let (row, cells) = next?;
        if cells.iter().all(|cell| cell_text(cell).is_none()) {
            continue;
        }
        let cells = fit_row(&file, row, HEADER.len(), cells)?;

        match pending.take() {
            None => pending = Some((row, cells)),
            Some((event_row, event)) => lapses.push(parse_award(event_row, &event, row, &cells)?),
        }
    }

    if let Some((row, _)) = pending {
        return Err(ConvertError::format_mismatch(
            &file,
            format!("award at row {} has no detail row", row),
        )
        .into());
    }

    info!("Read {} equity award lapses", lapses.len());
    Ok(lapses)
}

fn parse_award(
    event_row: usize,
    event: &[Data],
    detail_row: usize,
    detail: &[Data],
) -> Result<LapseRecord, ConvertError> {
    let label = cell_text(&event[COL_ACTION])
        .ok_or_else(|| ConvertError::invalid_cell(event_row, HEADER[COL_ACTION], "", "action is empty"))?;
    if label != LAPSE {
        return Err(ConvertError::UnknownTransactionType {
            row: event_row,
            label,
            detail: "is not a supported equity award action",
        });
    }

    if let Some(value) = cell_text(&detail[COL_DATE]) {
        return Err(ConvertError::invalid_cell(
            detail_row,
            HEADER[COL_DATE],
            value,
            "award detail row must not start a new event",
        ));
    }

    let date = required_date(event_row, event, COL_DATE)?;
    let symbol = cell_text(&event[COL_SYMBOL])
        .ok_or_else(|| ConvertError::invalid_cell(event_row, HEADER[COL_SYMBOL], "", "symbol is empty"))?;
    let quantity = required_decimal(event_row, event, COL_QUANTITY)?;

    let award_date = required_date(detail_row, detail, COL_AWARD_DATE)?;
    let fair_market_value = required_decimal(detail_row, detail, COL_FAIR_MARKET_VALUE)?;
    let withheld = required_decimal(detail_row, detail, COL_WITHHELD)?;
    let net_shares = required_decimal(detail_row, detail, COL_NET_SHARES)?;
    let taxes = cell_decimal(&detail[COL_TAXES])
        .map_err(|reason| invalid(detail_row, COL_TAXES, &detail[COL_TAXES], reason))?;

    let released = withheld.checked_add(net_shares).ok_or_else(|| {
        ConvertError::invalid_cell(
            detail_row,
            HEADER[COL_NET_SHARES],
            net_shares.to_string(),
            "withheld plus net shares is out of range",
        )
    })?;
    if released != quantity {
        return Err(ConvertError::invalid_cell(
            detail_row,
            HEADER[COL_NET_SHARES],
            net_shares.to_string(),
            format!(
                "withheld ({}) plus net shares does not add up to the vested quantity ({})",
                withheld, quantity
            ),
        ));
    }

    if fair_market_value <= Decimal::ZERO || net_shares < Decimal::ZERO {
        return Err(ConvertError::invalid_cell(
            detail_row,
            HEADER[COL_FAIR_MARKET_VALUE],
            fair_market_value.to_string(),
            "fair market value must be positive",
        ));
    }

    let lapse = LapseRecord {
        row: event_row,
        date,
        symbol,
        description: cell_text(&event[COL_DESCRIPTION]).unwrap_or_default(),
        quantity,
        award_date,
        fair_market_value,
        withheld,
        net_shares,
        taxes,
    };
    lapse.deposited_value()?;
    Ok(lapse)
}

fn required_date(row: usize, cells: &[Data], col: usize) -> Result<NaiveDate, ConvertError> {
    cell_date(&cells[col])
        .map_err(|reason| invalid(row, col, &cells[col], reason))?
        .ok_or_else(|| ConvertError::invalid_cell(row, HEADER[col], "", "date is empty"))
}

fn required_decimal(row: usize, cells: &[Data], col: usize) -> Result<Decimal, ConvertError> {
    cell_decimal(&cells[col])
        .map_err(|reason| invalid(row, col, &cells[col], reason))?
        .ok_or_else(|| ConvertError::invalid_cell(row, HEADER[col], "", "value is empty"))
}

fn invalid(row: usize, col: usize, cell: &Data, reason: String) -> ConvertError {
    ConvertError::invalid_cell(row, HEADER[col], cell_text(cell).unwrap_or_default(), reason)
}
