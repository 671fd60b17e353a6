use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Suffix that keeps stock tickers from colliding with real coin tickers
const STOCK_SUFFIX: &str = ":STOCK";

static STANDARD_TICKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]+$").expect("valid ticker regex"));

/// Synthetic coin identifier standing in for a stock ticker
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SyntheticAsset(String);

impl SyntheticAsset {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyntheticAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Symbol → synthetic asset mapping for one run
///
/// Built from the ticker translation table so that renamed or
/// broker-specific tickers resolve to one standard name before the synthetic
/// suffix is applied. Resolution is a pure function of the table.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    translations: BTreeMap<String, String>,
}

impl SymbolMap {
    pub fn new(translations: BTreeMap<String, String>) -> Self {
        Self { translations }
    }

    /// Ticker after translation, without the synthetic suffix
    pub fn ticker<'a>(&'a self, symbol: &'a str) -> &'a str {
        let symbol = symbol.trim();
        self.translations
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(symbol)
    }

    pub fn resolve(&self, symbol: &str) -> SyntheticAsset {
        SyntheticAsset(format!("{}{}", self.ticker(symbol), STOCK_SUFFIX))
    }

    /// Tickers made of anything but capital letters are often broker-specific
    /// names that will not match the same share bought elsewhere.
    pub fn is_standard(&self, symbol: &str) -> bool {
        STANDARD_TICKER.is_match(self.ticker(symbol))
    }
}
