//! ctc-stocks - broker statements to cryptotaxcalculator.io manual CSV
//!
//! This library reads brokerage transaction exports, maps each account event
//! onto the coin-transaction vocabulary of cryptotaxcalculator.io (stocks
//! become synthetic `TICKER:STOCK` coins), and writes the "Advanced Manual
//! CSV" import file.

pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod importers;
pub mod mapping;
pub mod output;
pub mod utils;

pub use config::Config;
pub use convert::{convert, ConversionReport, ConvertRequest};
pub use error::{ConvertError, Result};
