use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shipai::AiTuning;
use thiserror::Error;

pub(crate) const CONFIG_ENV_VAR: &str = "SHIPSIM_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SimConfig {
    pub(crate) tick_rate_hz: u32,
    pub(crate) tick_count: u64,
    /// The run saves, reloads and continues from the snapshot at this tick.
    pub(crate) save_at_tick: Option<u64>,
    pub(crate) snapshot_path: PathBuf,
    pub(crate) summary_interval_ticks: u64,
    pub(crate) tuning: AiTuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            tick_count: 1200,
            save_at_tick: Some(600),
            snapshot_path: env::temp_dir().join("shipsim").join("autosave.shai"),
            summary_interval_ticks: 100,
            tuning: AiTuning::default(),
        }
    }
}

impl SimConfig {
    pub(crate) fn dt(&self) -> f64 {
        1.0 / f64::from(self.tick_rate_hz)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_rate_hz",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.summary_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "summary_interval_ticks",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(save_at) = self.save_at_tick {
            if save_at == 0 || save_at > self.tick_count {
                return Err(ConfigError::Invalid {
                    field: "save_at_tick",
                    message: format!("must be within 1..={}, got {save_at}", self.tick_count),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Reads the file named by `SHIPSIM_CONFIG`, or returns the defaults when the
/// variable is unset or empty.
pub(crate) fn load_from_env() -> Result<SimConfig, ConfigError> {
    match env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        Some(path) => load_from_file(Path::new(&path)),
        None => {
            let config = SimConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

pub(crate) fn load_from_file(path: &Path) -> Result<SimConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> Result<SimConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config = serde_path_to_error::deserialize::<_, SimConfig>(&mut deserializer).map_err(
        |error| {
            let field = match error.path().to_string() {
                field if field.is_empty() || field == "." => "<root>".to_string(),
                field => field,
            };
            ConfigError::Parse {
                path: path.to_path_buf(),
                field,
                source: error.into_inner(),
            }
        },
    )?;
    config.validate()?;
    Ok(config)
}
