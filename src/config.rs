//! Process configuration.
//!
//! Loaded once at startup from a YAML file and `LOYALTY__` environment variables. The daily
//! operating parameters (rate, minimum bill, cap, code) are only seeds for the settings table:
//! engines read that table fresh for every operation.

use std::collections::{BTreeMap, HashSet};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::domain::{Reward, TierThresholds};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "loyalty.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LOYALTY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LOYALTY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LOYALTY_LOG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name used in the welcome text
    pub business_name: String,
    /// Replaces the generated welcome text
    pub welcome_text: Option<String>,
    /// IANA timezone in which business days are counted
    pub timezone: String,
    pub tiers: TierThresholds,
    /// Initial rows of the settings table
    pub settings: BTreeMap<String, String>,
    pub rewards: Vec<Reward>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            business_name: "Le Blounger".to_string(),
            welcome_text: None,
            timezone: "Africa/Cairo".to_string(),
            tiers: TierThresholds::default(),
            settings: BTreeMap::new(),
            rewards: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),
    #[error("silver threshold ({silver}) must not be above gold threshold ({gold})")]
    InvalidTiers { silver: u64, gold: u64 },
    #[error("invalid reward {0:?}: ids must be unique and costs positive and at most i64::MAX")]
    InvalidReward(String),
}

impl AppConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `loyalty.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder.add_source(environment()).build()?;

        Self::from_config(config)
    }

    fn from_config(config: ::config::Config) -> Result<Self, ConfigError> {
        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        if self.tiers.silver > self.tiers.gold {
            return Err(ConfigError::InvalidTiers {
                silver: self.tiers.silver,
                gold: self.tiers.gold,
            });
        }

        let mut ids = HashSet::new();
        for reward in &self.rewards {
            if reward.cost == 0
                || i64::try_from(reward.cost).is_err()
                || !ids.insert(reward.id.to_ascii_lowercase()) {
                return Err(ConfigError::InvalidReward(reward.id.clone()));
            }
        }

        Ok(())
    }

    /// Timezone in which business days are evaluated
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// `LOYALTY__` environment variables
///
/// Values stay strings: settings rows such as `DAILY_CODE=0042` must keep their leading zeros.
/// Numeric fields are still converted on deserialization.
fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(CONFIG_ENV_PREFIX).separator("__")
}
