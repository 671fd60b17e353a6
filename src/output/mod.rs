//! Destination schema: cryptotaxcalculator.io "Advanced Manual CSV"

pub mod writer;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

pub use writer::{write_csv, HEADER};

/// Timestamp layout expected by the importer
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Transaction types of the destination vocabulary that this tool emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputType {
    Buy,
    Sell,
    Fee,
    FiatDeposit,
    FiatWithdrawal,
    Interest,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Buy => "buy",
            OutputType::Sell => "sell",
            OutputType::Fee => "fee",
            OutputType::FiatDeposit => "fiat-deposit",
            OutputType::FiatWithdrawal => "fiat-withdrawal",
            OutputType::Interest => "interest",
        }
    }
}

/// One row of the output file, in column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    #[serde(rename = "Timestamp (UTC)", serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Type")]
    pub output_type: OutputType,
    #[serde(rename = "Base Currency")]
    pub base_currency: String,
    #[serde(rename = "Base Amount")]
    pub base_amount: Decimal,
    #[serde(rename = "Quote Currency (Optional)")]
    pub quote_currency: Option<String>,
    #[serde(rename = "Quote Amount (Optional)")]
    pub quote_amount: Option<Decimal>,
    #[serde(rename = "Fee Currency (Optional)")]
    pub fee_currency: Option<String>,
    #[serde(rename = "Fee Amount (Optional)")]
    pub fee_amount: Option<Decimal>,
    #[serde(rename = "From (Optional)")]
    pub from: Option<String>,
    #[serde(rename = "To (Optional)")]
    pub to: Option<String>,
    #[serde(rename = "ID (Optional)")]
    pub id: Option<String>,
    #[serde(rename = "Description (Optional)")]
    pub description: Option<String>,
    #[serde(rename = "Reference Price Per Unit (Optional)")]
    pub reference_price: Option<Decimal>,
    #[serde(rename = "Reference Price Currency (Optional)")]
    pub reference_price_currency: Option<String>,
}

impl OutputRow {
    /// Row with the mandatory columns set and every optional column empty
    pub fn new(
        timestamp: NaiveDateTime,
        output_type: OutputType,
        base_currency: impl Into<String>,
        base_amount: Decimal,
    ) -> Self {
        Self {
            timestamp,
            output_type,
            base_currency: base_currency.into(),
            base_amount,
            quote_currency: None,
            quote_amount: None,
            fee_currency: None,
            fee_amount: None,
            from: None,
            to: None,
            id: None,
            description: None,
            reference_price: None,
            reference_price_currency: None,
        }
    }

    pub fn with_quote(mut self, currency: impl Into<String>, amount: Decimal) -> Self {
        self.quote_currency = Some(currency.into());
        self.quote_amount = Some(amount);
        self
    }

    pub fn with_route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    pub fn with_reference_price(mut self, price: Decimal, currency: impl Into<String>) -> Self {
        self.reference_price = Some(price);
        self.reference_price_currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }
}

fn serialize_timestamp<S: Serializer>(timestamp: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.format(TIMESTAMP_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_output_type_serializes_to_destination_vocabulary() {
        for output_type in [
            OutputType::Buy,
            OutputType::Sell,
            OutputType::Fee,
            OutputType::FiatDeposit,
            OutputType::FiatWithdrawal,
            OutputType::Interest,
        ] {
            let json = serde_json::to_string(&output_type).unwrap();
            assert_eq!(json, format!("\"{}\"", output_type.as_str()));
        }
    }

    #[test]
    fn test_blank_description_is_omitted() {
        let ts = NaiveDate::from_ymd_opt(2023, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let row = OutputRow::new(ts, OutputType::Fee, "USD", dec!(1.5)).with_description("  ");
        assert_eq!(row.description, None);
    }
}
