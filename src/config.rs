//! Configuration loading
//!
//! TOML file plus `STOCK_JOURNAL_*` environment overrides. Every section
//! has working defaults so a bare binary runs without a config file.

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
}

impl Config {
    /// Load from a TOML file (optional) layered under environment
    /// variables, e.g. `STOCK_JOURNAL_DATABASE__PATH`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STOCK_JOURNAL").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Specs older than this are dropped instead of retried on recovery
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
    /// Idempotency window: at most one delivery per spec inside it
    #[serde(default = "default_dedup_window")]
    pub dedup_window_hours: u64,
    /// Soft wall-clock budget per tick; overruns only warn
    #[serde(default = "default_tick_budget")]
    pub tick_budget_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            grace_secs: default_grace(),
            dedup_window_hours: default_dedup_window(),
            tick_budget_secs: default_tick_budget(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_push_timeout(),
        }
    }
}

fn default_db_path() -> String {
    "stock_journal.db".to_string()
}

fn default_tick_interval() -> u64 {
    60
}

fn default_grace() -> u64 {
    300
}

fn default_dedup_window() -> u64 {
    24
}

fn default_tick_budget() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    10
}
