use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;
pub mod runner;

#[derive(Parser)]
#[command(name = "ctc-stocks")]
#[command(
    version,
    about = "Convert broker statements into cryptotaxcalculator.io manual CSV imports"
)]
#[command(
    long_about = "Convert brokerage transaction exports into the cryptotaxcalculator.io \"Advanced Manual CSV\" format. \
Stocks are represented as synthetic coins (TICKER:STOCK) so the calculator can track cost basis and gains for them."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a broker statement into a manual CSV import file
    Convert {
        /// Path to the broker statement (CSV or spreadsheet)
        input: PathBuf,

        /// Path of the CSV file to write
        output: PathBuf,

        /// Statement format (detected from the header when omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Schwab equity awards export describing Stock Plan Activity
        #[arg(long, value_name = "FILE")]
        equity_awards: Option<PathBuf>,

        /// Config file (defaults to <config dir>/ctc-stocks/config.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Validate and preview only, don't write the output file
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List supported statement formats and their expected headers
    Formats,
}
