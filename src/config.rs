//! Daemon configuration from environment variables
//!
//! Loaded once at startup (after `dotenv`) into an immutable `CounterConfig`
//! and handed to each component before any thread starts.

use crate::counter::channels::ChannelId;
use crate::counter::edges::EdgeMode;
use std::env;
use std::time::Duration;

/// Store connection parameters. All four are required.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Database name; the SQLite backend treats it as the file path
    pub database: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Where input samples come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputConfig {
    Stdin,
    File(String),
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Enabled channels, ascending, without duplicates
    pub channels: Vec<ChannelId>,
    pub store: StoreConfig,
    pub flush_interval: Duration,
    pub edge_mode: EdgeMode,
    /// Skip store writes for channels with nothing to report
    pub skip_zero_deltas: bool,
    /// Watcher wait timeout; `None` blocks until the next interrupt
    pub watch_timeout: Option<Duration>,
    pub input: InputConfig,
    /// How long shutdown waits for the watcher thread to finish
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
/// One week
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 7 * 24 * 3_600;
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

impl CounterConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `COUNTER_INPUTS` (required, comma-separated pin ids 0-7)
    /// - `STORE_HOST`, `STORE_USER`, `STORE_PASSWORD`, `STORE_DB` (required)
    /// - `FLUSH_INTERVAL_SECS` (default: 60, at most one week)
    /// - `EDGE_MODE` (default: both; also rising, baseline)
    /// - `SKIP_ZERO_DELTAS` (default: false)
    /// - `WATCH_TIMEOUT_MS` (default: 1000, 0 = wait forever)
    /// - `INPUT_SOURCE` (default: `-` for stdin, otherwise a file path)
    /// - `SHUTDOWN_GRACE_MS` (default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };

        let channels = parse_channels(&required("COUNTER_INPUTS")?)?;

        let store = StoreConfig {
            host: required("STORE_HOST")?,
            user: required("STORE_USER")?,
            password: required("STORE_PASSWORD")?,
            database: required("STORE_DB")?,
        };

        let flush_secs =
            parse_number(&lookup, "FLUSH_INTERVAL_SECS", DEFAULT_FLUSH_INTERVAL_SECS)?;
        if !(1..=MAX_FLUSH_INTERVAL_SECS).contains(&flush_secs) {
            return Err(ConfigError::InvalidValue(format!(
                "FLUSH_INTERVAL_SECS must be between 1 and {}, got {}",
                MAX_FLUSH_INTERVAL_SECS, flush_secs
            )));
        }

        let edge_mode = match lookup("EDGE_MODE") {
            Some(raw) => raw.parse::<EdgeMode>().map_err(ConfigError::InvalidValue)?,
            None => EdgeMode::default(),
        };

        let skip_zero_deltas = match lookup("SKIP_ZERO_DELTAS") {
            Some(raw) => raw.trim().to_lowercase().parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "SKIP_ZERO_DELTAS must be true or false, got '{}'",
                    raw
                ))
            })?,
            None => false,
        };

        let watch_ms = parse_number(&lookup, "WATCH_TIMEOUT_MS", DEFAULT_WATCH_TIMEOUT_MS)?;
        let watch_timeout = match watch_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let input = match lookup("INPUT_SOURCE").map(|s| s.trim().to_string()) {
            None => InputConfig::Stdin,
            Some(path) if path.is_empty() || path == "-" => InputConfig::Stdin,
            Some(path) => InputConfig::File(path),
        };

        let shutdown_grace = Duration::from_millis(parse_number(
            &lookup,
            "SHUTDOWN_GRACE_MS",
            DEFAULT_SHUTDOWN_GRACE_MS,
        )?);

        Ok(Self {
            channels,
            store,
            flush_interval: Duration::from_secs(flush_secs),
            edge_mode,
            skip_zero_deltas,
            watch_timeout,
            input,
            shutdown_grace,
        })
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{} must be a whole number, got '{}'",
                    key, raw
                ))
            }),
        None => Ok(default),
    }
}

/// Parse the channel list. Ids outside 0-7 are dropped; an empty list is an
/// error, a list with only out-of-range ids is not.
fn parse_channels(raw: &str) -> Result<Vec<ChannelId>, ConfigError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    if entries.is_empty() {
        return Err(ConfigError::InvalidValue("COUNTER_INPUTS lists no channels".to_string()));
    }

    let mut channels = Vec::new();
    for entry in entries {
        let id: i64 = entry.parse().map_err(|_| {
            ConfigError::InvalidValue(format!(
                "COUNTER_INPUTS entry '{}' is not a number",
                entry
            ))
        })?;
        match u8::try_from(id).ok().and_then(ChannelId::new) {
            Some(channel) => channels.push(channel),
            None => log::warn!("ignoring counter input {} (pins are 0-7)", id),
        }
    }

    channels.sort();
    channels.dedup();
    Ok(channels)
}
