use anyhow::Result;

use crate::cli::{formatters, Cli, Commands};
use crate::config::Config;
use crate::convert::{self, ConvertRequest};
use crate::importers::Format;

/// Execute a parsed command line, printing the result to stdout
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert {
            input,
            output,
            format,
            equity_awards,
            config,
            dry_run,
        } => {
            let format = format.as_deref().map(str::parse::<Format>).transpose()?;
            let config = Config::load(config.as_deref())?;
            let request = ConvertRequest {
                input,
                output,
                format,
                equity_awards,
                dry_run,
            };

            let report = convert::convert(&request, &config)?;
            if cli.json {
                println!("{}", formatters::format_conversion_json(&report));
            } else {
                print!("{}", formatters::format_conversion_table(&report));
            }
            Ok(())
        }

        Commands::Formats => {
            if cli.json {
                println!("{}", formatters::format_formats_json());
            } else {
                print!("{}", formatters::format_formats_table());
            }
            Ok(())
        }
    }
}
