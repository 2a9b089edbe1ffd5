//! Configuration management for Pointbook
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/pointbook"
//! key = "appState"
//!
//! [persistence]
//! debounce = "500ms"
//! forced_delay = "100ms"
//!
//! [points]
//! starting_balance = 1000
//! negative_balance = "allow"   # or "clamp"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::reducer::BalancePolicy;
use crate::state::STARTING_POINTS;
use crate::store::StoreOptions;

/// Storage key the whole snapshot lives under
pub const DEFAULT_STORAGE_KEY: &str = "appState";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub persistence: PersistenceConfig,
    pub points: PointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding snapshot files
    pub path: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet window before a debounced persist fires
    pub debounce: String,
    /// Delay of the out-of-band persist after bets and raffle entries
    pub forced_delay: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub starting_balance: i64,
    pub negative_balance: BalancePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/pointbook".to_string(),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce: "500ms".to_string(),
            forced_delay: "100ms".to_string(),
        }
    }
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            starting_balance: STARTING_POINTS,
            negative_balance: BalancePolicy::AllowNegative,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// `POINTBOOK_CONFIG` names the file explicitly, and then it must exist.
    /// Otherwise a missing file at the XDG location means defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("POINTBOOK_CONFIG") {
            return Self::load_from_path(&expand(&path));
        }

        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.key".to_string()).into());
        }
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.path".to_string()).into());
        }
        self.debounce()?;
        self.forced_delay()?;
        Ok(())
    }

    /// Snapshot directory with `~` expanded
    pub fn storage_dir(&self) -> PathBuf {
        expand(&self.storage.path)
    }

    pub fn debounce(&self) -> Result<Duration> {
        parse_duration("persistence.debounce", &self.persistence.debounce)
    }

    pub fn forced_delay(&self) -> Result<Duration> {
        parse_duration("persistence.forced_delay", &self.persistence.forced_delay)
    }

    /// Store settings described by this configuration
    pub fn store_options(&self) -> Result<StoreOptions> {
        Ok(StoreOptions {
            storage_key: self.storage.key.clone(),
            debounce: self.debounce()?,
            forced_delay: self.forced_delay()?,
            starting_points: self.points.starting_balance,
            balance_policy: self.points.negative_balance,
        })
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pointbook").join("config.toml"))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", field, e)).into())
}
