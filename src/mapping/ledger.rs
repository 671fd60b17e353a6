use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::symbols::SyntheticAsset;
use crate::error::ConvertError;

/// Running quantity held per synthetic asset
///
/// Used to reject sells of shares the statement never shows being acquired.
/// Lives for one run; its final state is only reported.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    holdings: BTreeMap<SyntheticAsset, Decimal>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding(&self, asset: &SyntheticAsset) -> Decimal {
        self.holdings.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add acquired shares
    pub fn credit(&mut self, row: usize, asset: &SyntheticAsset, quantity: Decimal) -> Result<Decimal, ConvertError> {
        let held = self.holding(asset);
        let total = held.checked_add(quantity).ok_or_else(|| {
            ConvertError::invalid_cell(
                row,
                "Quantity",
                quantity.to_string(),
                format!("holding of {} ({}) would be out of range", asset, held),
            )
        })?;

        self.holdings.insert(asset.clone(), total);
        Ok(total)
    }

    /// Remove sold shares. Fails without touching the ledger if the position
    /// would go negative.
    pub fn debit(&mut self, row: usize, asset: &SyntheticAsset, quantity: Decimal) -> Result<Decimal, ConvertError> {
        let held = self.holding(asset);
        if quantity > held {
            return Err(ConvertError::LedgerViolation {
                row,
                asset: asset.to_string(),
                requested: quantity,
                held,
            });
        }

        let remaining = held - quantity;
        self.holdings.insert(asset.clone(), remaining);
        Ok(remaining)
    }

    /// Non-zero positions, ordered by asset
    pub fn positions(&self) -> impl Iterator<Item = (&SyntheticAsset, Decimal)> {
        self.holdings
            .iter()
            .filter(|(_, quantity)| !quantity.is_zero())
            .map(|(asset, quantity)| (asset, *quantity))
    }
}
