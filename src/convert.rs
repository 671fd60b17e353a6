//! One conversion run: read, schedule, map, write
//!
//! Every source is read completely before the first row is mapped, and every
//! row is mapped before anything is written. Any error aborts the run with
//! the destination untouched.

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::importers::{self, equity_awards, Format};
use crate::mapping::{reconcile_equity_awards, schedule, Mapper, SourceRecord, SyntheticAsset};
use crate::output::{self, OutputRow, OutputType};

#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Forced statement format; sniffed from the header when `None`
    pub format: Option<Format>,
    pub equity_awards: Option<PathBuf>,
    /// Map and validate everything but write nothing
    pub dry_run: bool,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub format: Format,
    pub input: PathBuf,
    /// `None` on a dry run
    pub output: Option<PathBuf>,
    pub source_records: usize,
    pub rows: Vec<OutputRow>,
    pub holdings: Vec<(SyntheticAsset, Decimal)>,
}

impl ConversionReport {
    /// Output rows per type, in type order
    pub fn counts(&self) -> BTreeMap<OutputType, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.output_type).or_insert(0) += 1;
        }
        counts
    }
}

pub fn convert(request: &ConvertRequest, config: &Config) -> Result<ConversionReport> {
    let statement = importers::open_statement(&request.input, request.format)?;
    let format = statement.format();

    let statement = statement.collect::<Result<Vec<_>>>()?;
    let statement_records = statement.len();

    let lapses = match &request.equity_awards {
        Some(path) => {
            let lapses = equity_awards::read_equity_awards(path)?;
            info!("Read {} lapses from {:?}", lapses.len(), path);
            reconcile_equity_awards(&statement, &lapses, &path.display().to_string())?;
            lapses
        }
        None => Vec::new(),
    };

    let records: Vec<SourceRecord> = statement
        .into_iter()
        .map(SourceRecord::Statement)
        .chain(lapses.into_iter().map(SourceRecord::Lapse))
        .collect();
    info!(
        "Read {} statement records ({} total)",
        statement_records,
        records.len()
    );

    let records = schedule(records);
    let symbols = config.symbol_map();
    let mut mapper = Mapper::new(&symbols, format, request.equity_awards.is_some());

    let mut rows = Vec::new();
    for record in &records {
        rows.extend(mapper.map(record)?);
    }
    rows.sort_by_key(|row| row.timestamp);

    let holdings = mapper
        .into_ledger()
        .positions()
        .map(|(asset, quantity)| (asset.clone(), quantity))
        .collect();

    let output = if request.dry_run {
        info!("Dry run, not writing {:?}", request.output);
        None
    } else {
        output::write_csv(&request.output, &rows)?;
        Some(request.output.clone())
    };

    Ok(ConversionReport {
        format,
        input: request.input.clone(),
        output,
        source_records: records.len(),
        rows,
        holdings,
    })
}
