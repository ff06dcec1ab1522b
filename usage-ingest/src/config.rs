use serde::Deserialize;
use std::{fs, path::PathBuf};

use usage_client::{
    domain::{ChannelKind, PriceUnit, SiteZone, UnknownZone},
    simulation::{SimulationError, SimulationParameters},
};

use crate::sources::RecordFormat;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Zone(#[from] UnknownZone),
    #[error("store.uri is required for the postgres store")]
    MissingStoreUri,
    #[error("invalid simulation defaults: {0}")]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub price_unit: PriceUnit,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            price_unit: PriceUnit::default(),
        }
    }
}

fn default_timezone() -> String {
    "Australia/Sydney".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Postgres,
    /// Keep intervals in memory and print them; nothing is persisted.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    pub uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            uri: None,
            max_connections: default_max_connections(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl StoreConfig {
    pub fn uri(&self) -> Result<&str, ConfigError> {
        self.uri.as_deref().ok_or(ConfigError::MissingStoreUri)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_batch_size() -> usize {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelFileConfig {
    pub kind: ChannelKind,
    pub path: PathBuf,
    #[serde(default)]
    pub format: RecordFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceFileConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: RecordFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullConfig {
    #[serde(default)]
    pub channels: Vec<ChannelFileConfig>,
    pub prices: Option<PriceFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub solar_capacity_kw: f64,
    #[serde(default)]
    pub battery_capacity_kwh: f64,
    #[serde(default = "default_efficiency")]
    pub battery_round_trip_efficiency: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            solar_capacity_kw: 0.0,
            battery_capacity_kwh: 0.0,
            battery_round_trip_efficiency: default_efficiency(),
        }
    }
}

fn default_efficiency() -> f64 {
    0.9
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pull: PullConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        let path = env::var("USAGE_CONFIG").unwrap_or_else(|_| "usage-config.toml".to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })?;
        Self::from_toml_str(&contents)
    }

    /// Parses and checks a config document. The site zone and simulation
    /// defaults are validated here so bad values fail at startup.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.zone()?;
        cfg.parameters()?;
        Ok(cfg)
    }

    pub fn zone(&self) -> Result<SiteZone, ConfigError> {
        Ok(SiteZone::from_name(&self.site.timezone)?)
    }

    pub fn parameters(&self) -> Result<SimulationParameters, ConfigError> {
        let sim = &self.simulation;
        let params = SimulationParameters::new(
            sim.solar_capacity_kw,
            sim.battery_capacity_kwh,
            sim.battery_round_trip_efficiency,
        )?;
        Ok(params.with_zone(self.zone()?))
    }
}
