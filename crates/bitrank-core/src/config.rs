//! Engine configuration.
//!
//! Values are merged in order: built-in defaults, an optional TOML file,
//! then `BITRANK_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `BITRANK_SEARCH__MIN_CANDIDATE_POOL=100`).
//!
//! ```toml
//! [index]
//! dimension = 384
//!
//! [index.kind]
//! type = "partitioned"
//! partitions = 64
//! probes = 8
//!
//! [search]
//! candidate_multiplier = 8
//! min_candidate_pool = 50
//! ```

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "BITRANK_";

/// Configuration loading or validation failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A provider failed to load or a value had the wrong type.
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A value is outside its allowed range.
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(err.to_string())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrankConfig {
    /// Binary index settings.
    pub index: IndexConfig,
    /// Query-time settings.
    pub search: SearchConfig,
    /// Logging settings (applied by binaries).
    pub logging: LoggingConfig,
}

/// Binary index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding dimension `D`, fixed for the lifetime of an index.
    pub dimension: usize,
    /// Index layout.
    pub kind: IndexKind,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            kind: IndexKind::Flat,
        }
    }
}

/// Binary index layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    /// Exhaustive scan over every live code. Exact, the baseline.
    #[default]
    Flat,
    /// Coarse Hamming clusters; only the nearest partitions are scanned.
    Partitioned(PartitionParams),
}

/// Parameters of the partitioned index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionParams {
    /// Number of partitions built on reindex.
    pub partitions: usize,
    /// Number of nearest partitions scanned per query.
    pub probes: usize,
    /// Upper bound on clustering refinement rounds.
    pub max_iterations: usize,
    /// Minimum mean recall against the flat scan to enable partitions.
    pub min_recall: f64,
    /// Number of stored codes replayed as queries during validation.
    pub validation_queries: usize,
    /// Candidate pool used during validation.
    pub validation_pool: usize,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            partitions: 32,
            probes: 4,
            max_iterations: 10,
            min_recall: 0.9,
            validation_queries: 32,
            validation_pool: 50,
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidate pool multiplier over `top_k`.
    pub candidate_multiplier: usize,
    /// Lower bound on the candidate pool.
    pub min_candidate_pool: usize,
    /// Result count when a request does not give one.
    pub default_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: 8,
            min_candidate_pool: 50,
            default_top_k: 10,
        }
    }
}

impl SearchConfig {
    /// Candidate pool size `M` for a requested `top_k`:
    /// `max(top_k * candidate_multiplier, min_candidate_pool)`.
    #[must_use]
    pub fn candidate_pool(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.candidate_multiplier)
            .max(self.min_candidate_pool)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl BitrankConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// environment, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.dimension == 0 {
            return Err(invalid("index.dimension", "must be greater than 0"));
        }
        if let IndexKind::Partitioned(params) = self.index.kind {
            params.validate()?;
        }
        self.search.validate()
    }
}

impl SearchConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_multiplier == 0 {
            return Err(invalid(
                "search.candidate_multiplier",
                "must be greater than 0",
            ));
        }
        if self.min_candidate_pool == 0 {
            return Err(invalid("search.min_candidate_pool", "must be greater than 0"));
        }
        if self.default_top_k == 0 {
            return Err(invalid("search.default_top_k", "must be greater than 0"));
        }
        Ok(())
    }
}

impl PartitionParams {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 {
            return Err(invalid("index.kind.partitions", "must be greater than 0"));
        }
        if self.probes == 0 || self.probes > self.partitions {
            return Err(invalid(
                "index.kind.probes",
                format!("must be in 1..={}", self.partitions),
            ));
        }
        if self.max_iterations == 0 {
            return Err(invalid("index.kind.max_iterations", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.min_recall) {
            return Err(invalid("index.kind.min_recall", "must be within [0, 1]"));
        }
        if self.validation_pool == 0 {
            return Err(invalid("index.kind.validation_pool", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
