// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine configuration and its storage port.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key under which [`load_engine_config`] looks up the engine configuration.
pub const ENGINE_CONFIG_KEY: &str = "weft.engine";

/// Bounds and platform selection for variant enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Last epoch produced; rounds run for epochs `1..=max_epoch`.
    pub max_epoch: u32,
    /// Upper bound on the number of variants, the original included.
    pub max_variants: usize,
    /// Platforms whose mappings take part; `None` enables all.
    pub enabled_platforms: Option<BTreeSet<String>>,
    /// Worker threads used to expand a round.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_epoch: 2,
            max_variants: 1024,
            enabled_platforms: None,
            workers: 1,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    /// [`ConfigError::Serde`] for malformed JSON or unknown fields,
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] when `max_variants` or `workers` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_variants == 0 {
            return Err(ConfigError::Invalid("max_variants must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Whether the platform called `name` is enabled.
    #[must_use]
    pub fn is_platform_enabled(&self, name: &str) -> bool {
        self.enabled_platforms
            .as_ref()
            .map_or(true, |enabled| enabled.contains(name))
    }
}

/// Storage port for raw configuration blobs, keyed by logical name.
pub trait ConfigStore {
    /// Loads a raw blob. Returns [`ConfigError::NotFound`] when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Loads the engine configuration from `store`.
///
/// A missing or empty blob yields [`EngineConfig::default`].
///
/// # Errors
/// Store, parse, and validation failures.
pub fn load_engine_config<S>(store: &S) -> Result<EngineConfig, ConfigError>
where
    S: ConfigStore + ?Sized,
{
    match store.load_raw(ENGINE_CONFIG_KEY) {
        Ok(bytes) if bytes.is_empty() => Ok(EngineConfig::default()),
        Ok(bytes) => EngineConfig::from_json_slice(&bytes),
        Err(ConfigError::NotFound) => Ok(EngineConfig::default()),
        Err(e) => Err(e),
    }
}
