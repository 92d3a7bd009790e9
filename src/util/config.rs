use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use tracing::{debug, info};

use crate::domain::Mode;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "FreightServices";
const APP_NAME: &str = "FreightQuote";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_DISTANCE_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Top-level engine configuration. Every field has a default so a partial
/// JSON file (or none at all) is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the rate CSV files.
    pub data_dir: Option<PathBuf>,
    pub distance: DistanceConfig,
    pub limits: LimitsConfig,
    /// Cubic inches per pound for dimensional weight.
    pub dim_divisor: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            distance: DistanceConfig::default(),
            limits: LimitsConfig::default(),
            dim_divisor: dec!(166),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-attempt request timeout.
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub backoff_ms: u64,
    pub cache_ttl_secs: u64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DISTANCE_URL.to_string(),
            api_key: None,
            timeout_ms: 3_000,
            max_retries: 2,
            backoff_ms: 200,
            cache_ttl_secs: 60 * 60,
        }
    }
}

impl DistanceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Upper bound on one resolver call: every attempt timing out plus every
    /// backoff sleep.
    pub fn lookup_deadline(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let backoff_total: u64 = (0..self.max_retries)
            .map(|retry| self.backoff_ms.saturating_mul(1u64 << retry.min(16)))
            .sum();
        Duration::from_millis(
            self.timeout_ms
                .saturating_mul(attempts)
                .saturating_add(backoff_total),
        )
    }
}

/// Tool limits that flag, but never block, a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub hotshot: ModeLimits,
    pub air: ModeLimits,
    /// Air billable pounds per piece.
    pub air_max_piece_weight: Decimal,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hotshot: ModeLimits {
                max_weight: dec!(3000),
                max_total: dec!(6000),
            },
            air: ModeLimits {
                max_weight: dec!(1200),
                max_total: dec!(6000),
            },
            air_max_piece_weight: dec!(300),
        }
    }
}

impl LimitsConfig {
    pub fn for_mode(&self, mode: Mode) -> &ModeLimits {
        match mode {
            Mode::Hotshot => &self.hotshot,
            Mode::Air => &self.air,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeLimits {
    pub max_weight: Decimal,
    pub max_total: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: SerdeError,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, SerdeError> {
        serde_json::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Explicit path if given, else the platform config file when it exists,
    /// else defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::load(&path)?,
                None => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|name| env::var(name).ok());
        Ok(config)
    }

    /// `GOOGLE_MAPS_API_KEY` then `MAPS_API_KEY` fill a missing API key;
    /// `DISTANCE_API_URL` replaces the base URL.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing_key = self
            .distance
            .api_key
            .as_deref()
            .map(|key| key.trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            self.distance.api_key = lookup("GOOGLE_MAPS_API_KEY")
                .or_else(|| lookup("MAPS_API_KEY"))
                .filter(|key| !key.trim().is_empty());
        }
        if let Some(url) = lookup("DISTANCE_API_URL").filter(|url| !url.trim().is_empty()) {
            self.distance.base_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "limits": { "hotshot": { "max_weight": 10000, "max_total": 6000 } } }"#,
        )
        .unwrap();
        assert_eq!(config.limits.hotshot.max_weight, dec!(10000));
        assert_eq!(config.limits.air.max_weight, dec!(1200));
        assert_eq!(config.dim_divisor, dec!(166));
        assert_eq!(config.distance.timeout_ms, 3_000);
    }

    #[test]
    fn env_fills_missing_api_key_only() {
        let vars: HashMap<&str, &str> =
            [("MAPS_API_KEY", "from-env"), ("DISTANCE_API_URL", "http://localhost:9/dm")]
                .into_iter()
                .collect();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        let mut config = EngineConfig::default();
        config.apply_env(lookup);
        assert_eq!(config.distance.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.distance.base_url, "http://localhost:9/dm");

        let mut configured = EngineConfig::default();
        configured.distance.api_key = Some("from-file".into());
        configured.apply_env(lookup);
        assert_eq!(configured.distance.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn lookup_deadline_covers_retries() {
        let config = DistanceConfig {
            timeout_ms: 1_000,
            max_retries: 2,
            backoff_ms: 100,
            ..DistanceConfig::default()
        };
        // 3 attempts * 1000ms + 100ms + 200ms of backoff
        assert_eq!(config.lookup_deadline(), Duration::from_millis(3_300));
    }
}
