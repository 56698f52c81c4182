//! Configuration for the inspection tools
//!
//! Settings are layered, lowest precedence first: built-in defaults, a TOML
//! file, `TSDB_*` environment variables, then command-line flags (applied by
//! the binary).
//!
//! ```toml
//! db_path = "/var/lib/tsdb/data"
//! concurrency = 8
//! exact = false
//! precision = 14
//! log_level = "warn"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cardinality::hll::{DEFAULT_PRECISION, MAX_PRECISION, MIN_PRECISION};
use crate::cardinality::CountingMode;
use crate::error::{Error, Result};

/// Environment variable naming a config file when `--config` is not given
pub const CONFIG_PATH_ENV: &str = "TSDB_INSPECT_CONFIG";

/// Settings for a cardinality run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InspectConfig {
    /// Root directory containing database directories. Required.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Worker threads used to scan shards
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Count exactly instead of estimating
    #[serde(default)]
    pub exact: bool,

    /// HyperLogLog precision used when estimating
    #[serde(default = "default_precision")]
    pub precision: u8,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_concurrency() -> usize { num_cpus::get() }
fn default_precision() -> u8 { DEFAULT_PRECISION }
fn default_log_level() -> String { "warn".to_string() }

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            concurrency: default_concurrency(),
            exact: false,
            precision: default_precision(),
            log_level: default_log_level(),
        }
    }
}

impl InspectConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Defaults, then `path` (or the file named by `TSDB_INSPECT_CONFIG`),
    /// then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.or(env_path.as_deref()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("TSDB_DB_PATH") {
            self.db_path = Some(PathBuf::from(db_path));
        }
        if let Ok(concurrency) = std::env::var("TSDB_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(exact) = std::env::var("TSDB_EXACT") {
            if let Ok(e) = exact.parse() {
                self.exact = e;
            }
        }
        if let Ok(precision) = std::env::var("TSDB_HLL_PRECISION") {
            if let Ok(p) = precision.parse() {
                self.precision = p;
            }
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match &self.db_path {
            Some(path) if !path.as_os_str().is_empty() => {},
            _ => return Err(Error::MissingDbPath),
        }

        if self.concurrency == 0 {
            return Err(Error::Configuration("Concurrency must be > 0".to_string()));
        }

        if !(MIN_PRECISION..=MAX_PRECISION).contains(&self.precision) {
            return Err(Error::Configuration(format!(
                "Precision must be between {} and {}, got {}",
                MIN_PRECISION, MAX_PRECISION, self.precision
            )));
        }

        Ok(())
    }

    /// Counting strategy for the whole run
    pub fn counting_mode(&self) -> CountingMode {
        CountingMode::from_exact_flag(self.exact, self.precision)
    }
}
