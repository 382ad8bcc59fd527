//! Coordinator configuration.
//!
//! Loaded once at startup from a YAML file and passed explicitly to the
//! pieces that need it. Zero or missing numeric settings fall back to their
//! defaults.
//!
//! ```yaml
//! hosts:
//!   - 10.0.0.5:6379
//!   - 10.0.0.5:6380
//! password: s3cret
//! db: 0
//! mode: single
//! poll_interval_ms: 10
//! growth_threshold_percent: 75
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};

use crate::gate::GatePolicy;
use crate::redis::ClientOptions;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
const DEFAULT_GROWTH_THRESHOLD_PERCENT: i64 = aofc_status::DEFAULT_GROWTH_THRESHOLD_PERCENT;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5000;

/// How the store instances are deployed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Standalone instances; `db` is selected on connect.
    #[default]
    Single,

    /// Cluster nodes, each addressed directly; always db 0.
    Cluster,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Instance addresses (`host:port`) in fleet order.
    #[serde(default, deserialize_with = "deserialize_hosts")]
    pub hosts: Vec<String>,

    /// Password sent with `AUTH` on connect.
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database selected on connect (single mode only).
    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub mode: StoreMode,

    /// TCP connect timeout in seconds.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Reconnect attempts for a command that failed on a broken connection.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between polls and between fleet passes, in milliseconds.
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Log growth (percent over base size) a queued rewrite must exceed.
    #[serde(default = "default_growth_threshold_percent")]
    pub growth_threshold_percent: i64,

    /// Deadline for each status query or trigger call, in milliseconds.
    #[serde(default)]
    pub query_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_growth_threshold_percent() -> i64 {
    DEFAULT_GROWTH_THRESHOLD_PERCENT
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostList {
    List(Vec<String>),
    Joined(String),
}

/// Accept either a YAML list or a single comma-separated string.
fn deserialize_hosts<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let hosts = match HostList::deserialize(deserializer)? {
        HostList::List(hosts) => hosts,
        HostList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };

    Ok(hosts
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect())
}

impl Config {
    /// Load configuration from the file named by `AOFC_CONFIG`
    /// (default `config.yaml`), then apply `AOFC_LOG_LEVEL` if set.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("AOFC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;

        if let Ok(level) = std::env::var("AOFC_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse and normalize configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(contents).context("Failed to parse config YAML")?;
        config.normalize()
    }

    fn normalize(mut self) -> Result<Self> {
        if self.hosts.is_empty() {
            bail!("must have db hosts");
        }

        if self.timeout_secs == 0 {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.query_timeout_ms == 0 {
            self.query_timeout_ms = DEFAULT_QUERY_TIMEOUT_MS;
        }
        if self.db < 0 {
            self.db = 0;
        }
        if self.password.as_deref() == Some("") {
            self.password = None;
        }

        Ok(self)
    }

    /// Polling and admission policy for the scheduler and its gates.
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            growth_threshold_percent: self.growth_threshold_percent,
            call_timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }

    /// Connection options shared by every instance client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.timeout_secs),
            password: self.password.clone(),
            db: match self.mode {
                StoreMode::Single => self.db,
                StoreMode::Cluster => 0,
            },
            max_retries: self.max_retries,
        }
    }
}
