//! Node configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or no
//! file at all) yields a working node.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::constants::DEFAULT_MAX_NAME_LEN;
use crate::ledger::{Backoff, RetryPolicy};
use crate::registry::{NameCase, NamePolicy, PriceSchedule, MAINNET_PRICE_UNIT};
use crate::storage::StorageBackend;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GnsConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub rpc: RpcConfig,
}

impl Default for GnsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            registry: RegistryConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            rpc: RpcConfig::default(),
        }
    }
}

/// Name policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub name_case: NameCase,
    pub max_name_len: usize,
    /// Value of one USD in price units; 1000 on devnet
    pub price_unit: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name_case: NameCase::Sensitive,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            price_unit: MAINNET_PRICE_UNIT,
        }
    }
}

/// Where the registry lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: PathBuf::from("./gns_data"),
        }
    }
}

/// Retry behaviour for ledger calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 1 means a fixed delay
    pub multiplier: u32,
    /// 0 disables the per-call timeout
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
            multiplier: 1,
            call_timeout_ms: 30_000,
        }
    }
}

/// JSON-RPC listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8899,
        }
    }
}

impl GnsConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GnsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.max_name_len == 0 {
            return Err(ConfigError::Invalid {
                field: "registry.max_name_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.registry.price_unit == 0 {
            return Err(ConfigError::Invalid {
                field: "registry.price_unit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.multiplier == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.multiplier",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                reason: format!(
                    "{} is below initial_delay_ms {}",
                    self.retry.max_delay_ms, self.retry.initial_delay_ms
                ),
            });
        }
        Ok(())
    }

    pub fn name_policy(&self) -> NamePolicy {
        NamePolicy::new(self.registry.name_case, self.registry.max_name_len)
    }

    pub fn price_schedule(&self) -> PriceSchedule {
        PriceSchedule::new(self.registry.price_unit)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        let initial = Duration::from_millis(retry.initial_delay_ms);
        let backoff = if retry.multiplier <= 1 {
            Backoff::Fixed(initial)
        } else {
            Backoff::Exponential {
                initial,
                multiplier: retry.multiplier,
                max: Duration::from_millis(retry.max_delay_ms),
            }
        };

        let policy = RetryPolicy::new(retry.max_attempts, backoff);
        match retry.call_timeout_ms {
            0 => policy,
            ms => policy.with_timeout(Duration::from_millis(ms)),
        }
    }
}
