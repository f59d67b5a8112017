//! Simulator configuration.

use std::path::PathBuf;

use lockstake_accountant::AccountantConfig;
use lockstake_apr::AprConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LOCKSTAKE_CONFIG";

/// Complete simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Accountant settings.
    #[serde(default)]
    pub engine: AccountantConfig,
    /// APR calculator settings.
    #[serde(default)]
    pub apr: AprConfig,
    /// Scenario settings.
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// RNG seed. Runs with the same seed and config are identical.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Days to simulate; one epoch per day.
    #[serde(default = "default_days")]
    pub days: u64,
    /// Validators, numbered from 1.
    #[serde(default = "default_validators")]
    pub validators: u64,
    /// Delegators acting each day.
    #[serde(default = "default_delegators")]
    pub delegators: u8,
    /// Timestamp of day zero.
    #[serde(default = "default_start_timestamp")]
    pub start_timestamp: u64,
    /// Opening price of the feed.
    #[serde(default = "default_initial_price")]
    pub initial_price: u64,
    /// Largest daily price move.
    #[serde(default = "default_volatility_bps")]
    pub volatility_bps: u64,
    /// Chance that a day has no price vote.
    #[serde(default)]
    pub missed_price_bps: u64,
    /// Lowest uptime a validator may have on a given day.
    #[serde(default = "default_min_uptime_bps")]
    pub min_uptime_bps: u64,
    /// Largest amount a single action stakes.
    #[serde(default = "default_max_stake")]
    pub max_stake: u64,
    /// Wall-clock pause between simulated days. 0 = run flat out.
    #[serde(default)]
    pub tick_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the engine crates: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_seed() -> u64 {
    7
}

fn default_days() -> u64 {
    120
}

fn default_validators() -> u64 {
    4
}

fn default_delegators() -> u8 {
    16
}

fn default_start_timestamp() -> u64 {
    1_700_000_000
}

fn default_initial_price() -> u64 {
    1_000_000
}

fn default_volatility_bps() -> u64 {
    400
}

fn default_min_uptime_bps() -> u64 {
    8_000
}

fn default_max_stake() -> u64 {
    1_000_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            days: default_days(),
            validators: default_validators(),
            delegators: default_delegators(),
            start_timestamp: default_start_timestamp(),
            initial_price: default_initial_price(),
            volatility_bps: default_volatility_bps(),
            missed_price_bps: 0,
            min_uptime_bps: default_min_uptime_bps(),
            max_stake: default_max_stake(),
            tick_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl SimConfig {
    /// Load configuration from `$LOCKSTAKE_CONFIG` or `./lockstake.toml`.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: SimConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("lockstake.toml"))
    }
}
