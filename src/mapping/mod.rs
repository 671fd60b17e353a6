//! Record mapping: broker activity → coin-transaction vocabulary
//!
//! Each statement row is looked up in a fixed rule table and turned into
//! zero or more output rows. Stocks become synthetic coins through the
//! [`SymbolMap`], and every buy and sell passes through the
//! [`PositionLedger`] so that a sell of shares never acquired aborts the run.
//!
//! Statements only carry dates. Records are given a time of day by slot
//! (cash in, buys, sells and fees, cash out) so that same-day activity is
//! processed in an order the destination can replay; ties keep file order.

pub mod ledger;
pub mod symbols;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::ConvertError;
use crate::importers::{Action, Format, LapseRecord, RawRecord};
use crate::output::{OutputRow, OutputType};

pub use ledger::PositionLedger;
pub use symbols::{SymbolMap, SyntheticAsset};

/// Counterparty label for money coming from or going to the bank
const BANK: &str = "Bank";

/// Counterparty label for dividend income
const DIVIDENDS: &str = "Dividends";

/// Largest difference between a trade's net amount and quantity × price ∓ fees
/// that is still attributed to the broker rounding to cents.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Time of day assigned to date-only records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    CashIn,
    Buy,
    SellOrFee,
    CashOut,
}

impl Slot {
    pub fn at(self, date: NaiveDate) -> NaiveDateTime {
        let hour = match self {
            Slot::CashIn => 0,
            Slot::Buy => 1,
            Slot::SellOrFee => 2,
            Slot::CashOut => 3,
        };
        date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

/// How a statement action is represented in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Buy,
    Sell,
    Fee,
    Dividend,
    Interest,
    Deposit,
    Withdrawal,
    /// Deposit or withdrawal depending on the sign of the amount
    Transfer,
    /// No rows of its own: the equity awards export describes the event
    CoveredByEquityAwards,
}

/// The mapping table. Actions without an entry abort the run.
pub fn rule_for(action: Action) -> Option<Rule> {
    match action {
        Action::Buy => Some(Rule::Buy),
        Action::Sell => Some(Rule::Sell),
        Action::Fee => Some(Rule::Fee),
        Action::Dividend => Some(Rule::Dividend),
        Action::Interest => Some(Rule::Interest),
        Action::Deposit => Some(Rule::Deposit),
        Action::Withdrawal => Some(Rule::Withdrawal),
        Action::Transfer => Some(Rule::Transfer),
        Action::StockPlanActivity => Some(Rule::CoveredByEquityAwards),
        Action::Unmapped => None,
    }
}

/// A record from any of the run's sources
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Statement(RawRecord),
    Lapse(LapseRecord),
}

impl SourceRecord {
    pub fn row(&self) -> usize {
        match self {
            SourceRecord::Statement(record) => record.row,
            SourceRecord::Lapse(lapse) => lapse.row,
        }
    }

    /// Scheduling timestamp: the record's date at its slot
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            SourceRecord::Statement(record) => statement_slot(record).at(record.date),
            SourceRecord::Lapse(lapse) => Slot::CashIn.at(lapse.date),
        }
    }
}

fn statement_slot(record: &RawRecord) -> Slot {
    match rule_for(record.action) {
        Some(Rule::Buy) => Slot::Buy,
        Some(Rule::Sell) | Some(Rule::Fee) => Slot::SellOrFee,
        Some(Rule::Withdrawal) => Slot::CashOut,
        Some(Rule::Transfer) if record.amount.is_some_and(|a| a < Decimal::ZERO) => Slot::CashOut,
        _ => Slot::CashIn,
    }
}

/// Order records for processing: by scheduling timestamp, ties in source order
pub fn schedule(mut records: Vec<SourceRecord>) -> Vec<SourceRecord> {
    records.sort_by_key(SourceRecord::timestamp);
    records
}

/// Pair every Stock Plan Activity row with the lapse that released its shares
///
/// A pair shares date, symbol and share count (the lapse's net shares
/// deposited), and each lapse pairs at most once. Lapses whose shares were
/// all withheld have no statement counterpart.
pub fn reconcile_equity_awards(
    statement: &[RawRecord],
    lapses: &[LapseRecord],
    awards_file: &str,
) -> Result<(), ConvertError> {
    let mut unmatched: Vec<&LapseRecord> = lapses.iter().filter(|l| !l.net_shares.is_zero()).collect();

    for record in statement.iter().filter(|r| r.action == Action::StockPlanActivity) {
        let symbol = record.symbol()?;
        let quantity = record.quantity()?;
        let paired = unmatched
            .iter()
            .position(|l| l.date == record.date && l.symbol == symbol && l.net_shares == quantity);

        match paired {
            Some(idx) => {
                let lapse = unmatched.remove(idx);
                debug!("Row {} paired with award at row {}", record.row, lapse.row);
            }
            None => {
                return Err(ConvertError::MissingSource {
                    row: record.row,
                    reason: format!(
                        "no lapse in {} deposits {} {} on {}",
                        awards_file,
                        quantity,
                        symbol,
                        record.date.format("%m/%d/%Y")
                    ),
                })
            }
        }
    }

    if let Some(lapse) = unmatched.first() {
        return Err(ConvertError::format_mismatch(
            awards_file,
            format!(
                "award at row {} ({} {} on {}) has no matching 'Stock Plan Activity' row in the statement",
                lapse.row,
                lapse.net_shares,
                lapse.symbol,
                lapse.date.format("%m/%d/%Y")
            ),
        ));
    }

    Ok(())
}

/// Maps records to output rows, owning the run's position ledger
pub struct Mapper<'a> {
    symbols: &'a SymbolMap,
    format: Format,
    has_equity_awards: bool,
    ledger: PositionLedger,
    warned: HashSet<String>,
}

impl<'a> Mapper<'a> {
    pub fn new(symbols: &'a SymbolMap, format: Format, has_equity_awards: bool) -> Self {
        Self {
            symbols,
            format,
            has_equity_awards,
            ledger: PositionLedger::new(),
            warned: HashSet::new(),
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> PositionLedger {
        self.ledger
    }

    pub fn map(&mut self, record: &SourceRecord) -> Result<Vec<OutputRow>, ConvertError> {
        let rows = match record {
            SourceRecord::Statement(record) => self.map_statement(record)?,
            SourceRecord::Lapse(lapse) => self.map_lapse(lapse)?,
        };
        debug!("Row {} → {} output rows", record.row(), rows.len());
        Ok(rows)
    }

    fn map_statement(&mut self, record: &RawRecord) -> Result<Vec<OutputRow>, ConvertError> {
        let rule = rule_for(record.action).ok_or_else(|| ConvertError::UnknownTransactionType {
            row: record.row,
            label: record.label.clone(),
            detail: "has no defined mapping",
        })?;

        let timestamp = statement_slot(record).at(record.date);
        let exchange = self.format.exchange();
        let currency = record.currency;

        match rule {
            Rule::Buy | Rule::Sell => self.map_trade(record, rule, timestamp),

            Rule::Fee => {
                let amount = record.amount()?;
                expect_sign(record, amount, false, "a fee must be a debit")?;
                Ok(vec![OutputRow::new(timestamp, OutputType::Fee, currency, amount.abs())
                    .with_route(exchange, exchange)
                    .with_description(&record.description)])
            }

            Rule::Dividend => {
                let amount = record.amount()?;
                expect_sign(record, amount, true, "a dividend must be a credit")?;
                self.warn_once(
                    DIVIDENDS,
                    "Dividends are categorized as 'fiat-deposit' so they contribute to the cash balance. \
                     They are excluded from capital gains, as dividends are taxed separately.",
                );
                Ok(vec![OutputRow::new(timestamp, OutputType::FiatDeposit, currency, amount)
                    .with_route(DIVIDENDS, exchange)
                    .with_description(format!("{} ({})", record.description, record.symbol()?))])
            }

            Rule::Interest => {
                let amount = record.amount()?;
                expect_sign(record, amount, true, "interest must be a credit")?;
                Ok(vec![OutputRow::new(timestamp, OutputType::Interest, currency, amount)
                    .with_route(exchange, exchange)
                    .with_description(&record.description)])
            }

            Rule::Deposit => {
                let amount = record.amount()?;
                expect_sign(record, amount, true, "a deposit must be a credit")?;
                Ok(vec![self.cash_row(record, timestamp, amount)])
            }

            Rule::Withdrawal => {
                let amount = record.amount()?;
                expect_sign(record, amount, false, "a withdrawal must be a debit")?;
                Ok(vec![self.cash_row(record, timestamp, amount)])
            }

            Rule::Transfer => {
                let amount = record.amount()?;
                if amount.is_zero() {
                    return Err(ConvertError::invalid_cell(
                        record.row,
                        "Amount",
                        amount.to_string(),
                        "a transfer must move money",
                    ));
                }
                Ok(vec![self.cash_row(record, timestamp, amount)])
            }

            Rule::CoveredByEquityAwards => {
                if !self.has_equity_awards {
                    return Err(ConvertError::MissingSource {
                        row: record.row,
                        reason: format!(
                            "'{}' shares are described by the equity awards export; pass --equity-awards",
                            record.label
                        ),
                    });
                }
                Ok(Vec::new())
            }
        }
    }

    fn map_trade(
        &mut self,
        record: &RawRecord,
        rule: Rule,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<OutputRow>, ConvertError> {
        let symbol = record.symbol()?;
        let quantity = record.quantity()?;
        let price = record.price()?;
        let amount = record.amount()?;
        let fees = record.fees();

        if quantity <= Decimal::ZERO {
            return Err(ConvertError::invalid_cell(
                record.row,
                "Quantity",
                quantity.to_string(),
                "quantity must be positive",
            ));
        }
        if price < Decimal::ZERO {
            return Err(ConvertError::invalid_cell(
                record.row,
                "Price",
                price.to_string(),
                "price cannot be negative",
            ));
        }
        if fees < Decimal::ZERO {
            return Err(ConvertError::invalid_cell(
                record.row,
                "Fees & Comm",
                fees.to_string(),
                "fees cannot be negative",
            ));
        }

        let out_of_range = || {
            ConvertError::invalid_cell(
                record.row,
                "Quantity",
                quantity.to_string(),
                format!("value at price {} is out of range", price),
            )
        };
        let gross = quantity.checked_mul(price).ok_or_else(&out_of_range)?;
        let (output_type, expected) = if rule == Rule::Buy {
            (OutputType::Buy, gross.checked_add(fees).map(|total| -total))
        } else {
            (OutputType::Sell, gross.checked_sub(fees))
        };
        let expected = expected.ok_or_else(&out_of_range)?;

        let consistent = amount
            .checked_sub(expected)
            .is_some_and(|diff| diff.abs() <= AMOUNT_TOLERANCE);
        if !consistent {
            return Err(ConvertError::invalid_cell(
                record.row,
                "Amount",
                amount.to_string(),
                format!("inconsistent with quantity × price and fees (expected {})", expected),
            ));
        }

        let asset = self.symbols.resolve(symbol);
        self.check_ticker(symbol);

        if output_type == OutputType::Sell {
            self.ledger.debit(record.row, &asset, quantity)?;
        } else {
            self.ledger.credit(record.row, &asset, quantity)?;
        }

        let exchange = self.format.exchange();
        let currency = record.currency;
        let mut rows = vec![OutputRow::new(timestamp, output_type, asset.as_str(), quantity)
            .with_quote(currency, gross)
            .with_route(exchange, exchange)
            .with_description(&record.description)
            .with_reference_price(price, currency)];

        if !fees.is_zero() {
            rows.push(
                OutputRow::new(timestamp, OutputType::Fee, currency, fees)
                    .with_route(exchange, exchange)
                    .with_description(format!("{} fees & commissions: {} {}", exchange, record.label, symbol)),
            );
        }

        Ok(rows)
    }

    fn map_lapse(&mut self, lapse: &LapseRecord) -> Result<Vec<OutputRow>, ConvertError> {
        if lapse.net_shares.is_zero() {
            debug!("Lapse at row {} deposited no shares", lapse.row);
            return Ok(Vec::new());
        }

        let exchange = self.format.exchange();
        let currency = self.format.currency();
        let value = lapse.deposited_value()?;
        let asset = self.symbols.resolve(&lapse.symbol);
        self.check_ticker(&lapse.symbol);
        self.ledger.credit(lapse.row, &asset, lapse.net_shares)?;

        Ok(vec![
            OutputRow::new(Slot::CashIn.at(lapse.date), OutputType::FiatDeposit, currency, value)
                .with_route(BANK, exchange)
                .with_description(format!(
                    "Modeled from fair market value of {} shares of {} at {} per share, to keep fiat total consistent.",
                    lapse.net_shares, lapse.symbol, lapse.fair_market_value
                )),
            OutputRow::new(Slot::Buy.at(lapse.date), OutputType::Buy, asset.as_str(), lapse.net_shares)
                .with_quote(currency, value)
                .with_route(exchange, exchange)
                .with_description(format!(
                    "Lapse of {} Restricted Stock Units (RSU) of {} at {} per share.",
                    lapse.net_shares, lapse.symbol, lapse.fair_market_value
                ))
                .with_reference_price(lapse.fair_market_value, currency),
        ])
    }

    fn cash_row(&self, record: &RawRecord, timestamp: NaiveDateTime, amount: Decimal) -> OutputRow {
        let exchange = self.format.exchange();
        let (output_type, from, to) = if amount > Decimal::ZERO {
            (OutputType::FiatDeposit, BANK, exchange)
        } else {
            (OutputType::FiatWithdrawal, exchange, BANK)
        };

        OutputRow::new(timestamp, output_type, record.currency, amount.abs())
            .with_route(from, to)
            .with_description(format!("{} {}", record.label, record.description))
    }

    fn check_ticker(&mut self, symbol: &str) {
        if !self.symbols.is_standard(symbol) {
            let ticker = self.symbols.ticker(symbol).to_string();
            self.warn_once(
                &format!("Ticker {}", ticker),
                &format!(
                    "The ticker '{}' contains characters other than capital letters. It may not be a \
                     standardised name and may not match the same shares from other brokers. \
                     Consider adding a translation to the [tickers] config table.",
                    ticker
                ),
            );
        }
    }

    fn warn_once(&mut self, group: &str, message: &str) {
        if self.warned.insert(group.to_string()) {
            warn!("{}: {}", group, message);
        }
    }
}

fn expect_sign(record: &RawRecord, amount: Decimal, positive: bool, reason: &str) -> Result<(), ConvertError> {
    let ok = if positive {
        amount > Decimal::ZERO
    } else {
        amount < Decimal::ZERO
    };
    if ok {
        Ok(())
    } else {
        Err(ConvertError::invalid_cell(record.row, "Amount", amount.to_string(), reason))
    }
}
