//! Engine configuration: defaults, environment loading, TOML files, validation.
//!
//! Environment values are read from `IPI_*` variables. Invalid values fall
//! back to defaults without failing; [`EngineConfig::validate`] is where
//! missing or inconsistent settings are rejected.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `IPI_DATA_FILE` | none | Data file path (required) |
//! | `IPI_PERFORMANCE_PROFILE` | Default | Memory/latency preset |
//! | `IPI_CONCURRENCY` | CPU count | Expected concurrent lookups |
//! | `IPI_AUTO_UPDATE` | true | Poll the distributor for updates |
//! | `IPI_FILE_WATCH` | true | Reload when the data file changes |
//! | `IPI_POLLING_INTERVAL_MINS` | 30 | Update poll period (minutes) |
//! | `IPI_RANDOMIZATION_SECS` | 600 | Max jitter per poll (seconds) |
//! | `IPI_UPDATE_ON_START` | false | Check for an update before the first load |
//! | `IPI_UPDATE_URL` | none | Custom update source |
//! | `IPI_LICENSE_KEY` | none | Distributor license key |
//! | `IPI_TEMP_DATA_COPY` | true | Load from private snapshots |
//! | `IPI_TEMP_DIR` | system temp | Parent of the snapshot directory |
//! | `IPI_PROPERTIES` | default list | Comma-separated properties to resolve |
//! | `IPI_MAX_RETRIES` | 3 | Update-on-start attempts |
//! | `IPI_WATCH_DEBOUNCE_MS` | 500 | File-watch quiet period (ms) |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distributor::UpdateRequest;
use crate::native::{IpiConfig, PerformanceProfile, PropertySet, DEFAULT_PROPERTIES};
use crate::triggers::poll::PollSettings;

const DEFAULT_POLLING_INTERVAL_MINS: u64 = 30;
const DEFAULT_RANDOMIZATION_SECS: u64 = 600;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;
const DEFAULT_PRODUCT: &str = "ip-intelligence";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No data file provided")]
    MissingDataFile,

    #[error("Data file not found: {0}")]
    DataFileNotFound(PathBuf),

    #[error("Temp directory not found: {0}")]
    TempDirNotFound(PathBuf),

    #[error("Auto update is enabled without a custom URL; a license key is required")]
    LicenseKeyRequired,

    #[error("Auto update is enabled but no distributor was supplied")]
    MissingDistributor,

    #[error("Polling interval must be greater than zero")]
    InvalidPollingInterval,

    #[error("Max retries must be greater than zero")]
    InvalidMaxRetries,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_file: Option<PathBuf>,
    pub ipi: IpiConfig,
    pub properties: PropertySet,
    pub auto_update: bool,
    pub file_watch: bool,
    pub polling_interval: Duration,
    pub randomization: Duration,
    pub update_on_start: bool,
    pub update_url: Option<String>,
    pub license_key: Option<String>,
    pub product: String,
    pub temp_data_copy: bool,
    pub temp_dir: Option<PathBuf>,
    pub max_retries: u32,
    pub watch_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            ipi: IpiConfig::default(),
            properties: PropertySet::parse(DEFAULT_PROPERTIES),
            auto_update: true,
            file_watch: true,
            polling_interval: Duration::from_secs(DEFAULT_POLLING_INTERVAL_MINS * 60),
            randomization: Duration::from_secs(DEFAULT_RANDOMIZATION_SECS),
            update_on_start: false,
            update_url: None,
            license_key: None,
            product: DEFAULT_PRODUCT.to_string(),
            temp_data_copy: true,
            temp_dir: None,
            max_retries: DEFAULT_MAX_RETRIES,
            watch_debounce: Duration::from_millis(DEFAULT_WATCH_DEBOUNCE_MS),
        }
    }
}

/// On-disk / environment form. Every field is optional and overrides the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    data_file: Option<PathBuf>,
    performance_profile: Option<String>,
    concurrency: Option<u16>,
    auto_update: Option<bool>,
    file_watch: Option<bool>,
    polling_interval_mins: Option<u64>,
    randomization_secs: Option<u64>,
    update_on_start: Option<bool>,
    update_url: Option<String>,
    license_key: Option<String>,
    product: Option<String>,
    temp_data_copy: Option<bool>,
    temp_dir: Option<PathBuf>,
    properties: Option<String>,
    max_retries: Option<u32>,
    watch_debounce_ms: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(profile) = self.performance_profile {
            config.ipi = IpiConfig::new(PerformanceProfile::parse_lossy(&profile));
        }
        if let Some(concurrency) = self.concurrency {
            config.ipi.concurrency = concurrency.max(1);
        }
        if let Some(properties) = self.properties {
            config.properties = PropertySet::parse(&properties);
        }
        config.data_file = self.data_file.filter(|p| !p.as_os_str().is_empty());
        config.auto_update = self.auto_update.unwrap_or(config.auto_update);
        config.file_watch = self.file_watch.unwrap_or(config.file_watch);
        if let Some(mins) = self.polling_interval_mins {
            config.polling_interval = Duration::from_secs(mins.saturating_mul(60));
        }
        if let Some(secs) = self.randomization_secs {
            config.randomization = Duration::from_secs(secs);
        }
        config.update_on_start = self.update_on_start.unwrap_or(config.update_on_start);
        config.update_url = self.update_url.filter(|u| !u.trim().is_empty());
        config.license_key = self.license_key.filter(|k| !k.trim().is_empty());
        config.product = self.product.unwrap_or(config.product);
        config.temp_data_copy = self.temp_data_copy.unwrap_or(config.temp_data_copy);
        config.temp_dir = self.temp_dir.filter(|p| !p.as_os_str().is_empty());
        config.max_retries = self.max_retries.unwrap_or(config.max_retries);
        if let Some(ms) = self.watch_debounce_ms {
            config.watch_debounce = Duration::from_millis(ms);
        }
        config
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a bool env var; `true/1/yes/on` and `false/0/no/off`, anything else is `None`.
fn env_bool(key: &str) -> Option<bool> {
    match env_string(key)?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a numeric env var, `None` on missing or invalid.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}

impl EngineConfig {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self { data_file: Some(data_file.into()), ..Self::default() }
    }

    /// Load from `IPI_*` environment variables.
    pub fn from_env() -> Self {
        ConfigFile {
            data_file: env_string("IPI_DATA_FILE").map(PathBuf::from),
            performance_profile: env_string("IPI_PERFORMANCE_PROFILE"),
            concurrency: env_parse("IPI_CONCURRENCY"),
            auto_update: env_bool("IPI_AUTO_UPDATE"),
            file_watch: env_bool("IPI_FILE_WATCH"),
            polling_interval_mins: env_parse("IPI_POLLING_INTERVAL_MINS"),
            randomization_secs: env_parse("IPI_RANDOMIZATION_SECS"),
            update_on_start: env_bool("IPI_UPDATE_ON_START"),
            update_url: env_string("IPI_UPDATE_URL"),
            license_key: env_string("IPI_LICENSE_KEY"),
            product: env_string("IPI_PRODUCT"),
            temp_data_copy: env_bool("IPI_TEMP_DATA_COPY"),
            temp_dir: env_string("IPI_TEMP_DIR").map(PathBuf::from),
            properties: env_string("IPI_PROPERTIES"),
            max_retries: env_parse("IPI_MAX_RETRIES"),
            watch_debounce_ms: env_parse("IPI_WATCH_DEBOUNCE_MS"),
        }
        .into_config()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.into_config())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    pub fn with_ipi_config(mut self, ipi: IpiConfig) -> Self {
        self.ipi = ipi;
        self
    }

    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    pub fn with_file_watch(mut self, enabled: bool) -> Self {
        self.file_watch = enabled;
        self
    }

    pub fn with_polling_interval_mins(self, mins: u64) -> Self {
        self.with_polling_interval(Duration::from_secs(mins.saturating_mul(60)))
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_randomization_secs(self, secs: u64) -> Self {
        self.with_randomization(Duration::from_secs(secs))
    }

    pub fn with_randomization(mut self, bound: Duration) -> Self {
        self.randomization = bound;
        self
    }

    pub fn with_update_on_start(mut self, enabled: bool) -> Self {
        self.update_on_start = enabled;
        self
    }

    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = Some(url.into());
        self
    }

    pub fn with_license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    pub fn with_temp_data_copy(mut self, enabled: bool) -> Self {
        self.temp_data_copy = enabled;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = debounce;
        self
    }

    /// Check the configuration before any resource is acquired.
    ///
    /// Returns the data file path on success.
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        let data_file = self.data_file.as_deref().ok_or(ConfigError::MissingDataFile)?;
        if !data_file.is_file() {
            return Err(ConfigError::DataFileNotFound(data_file.to_path_buf()));
        }
        if let Some(dir) = self.temp_dir.as_deref().filter(|_| self.temp_data_copy) {
            if !dir.is_dir() {
                return Err(ConfigError::TempDirNotFound(dir.to_path_buf()));
            }
        }
        if self.auto_update {
            if self.update_url.is_none() && self.license_key.is_none() {
                return Err(ConfigError::LicenseKeyRequired);
            }
            if self.polling_interval.is_zero() {
                return Err(ConfigError::InvalidPollingInterval);
            }
        }
        if self.update_on_start && self.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        Ok(data_file)
    }

    pub fn update_request(&self) -> UpdateRequest {
        UpdateRequest {
            url: self.update_url.clone(),
            license_key: self.license_key.clone(),
            product: self.product.clone(),
            last_updated: None,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.polling_interval,
            randomization: self.randomization,
            request: self.update_request(),
        }
    }

    /// Serializable summary with the license key redacted.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            data_file: self.data_file.clone(),
            performance_profile: self.ipi.profile().as_str(),
            concurrency: self.ipi.concurrency,
            properties: self.properties.to_list(),
            auto_update: self.auto_update,
            file_watch: self.file_watch,
            polling_interval_secs: self.polling_interval.as_secs(),
            randomization_secs: self.randomization.as_secs(),
            update_on_start: self.update_on_start,
            update_url: self.update_url.clone(),
            license_key_set: self.license_key.is_some(),
            temp_data_copy: self.temp_data_copy,
            temp_dir: self.temp_dir.clone(),
            max_retries: self.max_retries,
            watch_debounce_ms: u64::try_from(self.watch_debounce.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub data_file: Option<PathBuf>,
    pub performance_profile: &'static str,
    pub concurrency: u16,
    pub properties: String,
    pub auto_update: bool,
    pub file_watch: bool,
    pub polling_interval_secs: u64,
    pub randomization_secs: u64,
    pub update_on_start: bool,
    pub update_url: Option<String>,
    pub license_key_set: bool,
    pub temp_data_copy: bool,
    pub temp_dir: Option<PathBuf>,
    pub max_retries: u32,
    pub watch_debounce_ms: u64,
}
