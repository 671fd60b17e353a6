//! User configuration
//!
//! Read from `--config` when given, otherwise from
//! `<config home>/ctc-stocks/config.toml` if that file exists. The only table
//! is `[tickers]`, which extends the built-in ticker translations:
//!
//! ```toml
//! [tickers]
//! FB = "META"
//! ```

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConvertError;
use crate::mapping::SymbolMap;

const CONFIG_DIR: &str = "ctc-stocks";
const CONFIG_FILENAME: &str = "config.toml";

/// Renamed tickers that must resolve to one synthetic asset
const BUILTIN_TICKERS: &[(&str, &str)] = &[("VACQ", "RKLB")];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ticker translations applied before the synthetic suffix
    pub tickers: BTreeMap<String, String>,
}

impl Config {
    pub fn parse(text: &str, source: &Path) -> Result<Self, ConvertError> {
        toml::from_str(text).map_err(|e| ConvertError::Config(format!("{}: {}", source.display(), e)))
    }

    /// Load the explicit file, or the default one if present, or nothing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConvertError::Config(format!("{}: file not found", path.display())).into());
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Ok(path) if path.exists() => path,
                Ok(path) => {
                    debug!("No config at {:?}, using built-in settings", path);
                    return Ok(Self::default());
                }
                Err(e) => {
                    debug!("Config directory unavailable: {}", e);
                    return Ok(Self::default());
                }
            },
        };

        let text = fs::read_to_string(&path)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&text, &path)?;
        info!("Loaded config from {:?} ({} ticker translations)", path, config.tickers.len());
        Ok(config)
    }

    /// Built-in translations overlaid with the configured ones
    pub fn symbol_map(&self) -> SymbolMap {
        let mut translations: BTreeMap<String, String> = BUILTIN_TICKERS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        for (from, to) in &self.tickers {
            translations.insert(from.trim().to_string(), to.trim().to_string());
        }
        SymbolMap::new(translations)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dir_spec::config_home)
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}
