// Suite configuration
//
// Every option has a default so tests stay terse. A suite can load overrides from
// JSON and from STEADYPAGE_* environment variables (useful on slow CI machines).

use crate::error::{Error, Result};
use crate::network::{DEFAULT_BLOCKED_DOMAINS, DEFAULT_BLOCKED_RESOURCE_TYPES, ResourceType};
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default number of navigation attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default time budget of one navigation attempt (30 seconds)
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default slot reserved for the forced reload after a failed attempt (5 seconds)
///
/// Taken out of the attempt budget, and never more than half of it.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause after a page is ready (1 second)
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default expected status of the main document
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Default alternate status accepted for the main document (Not Modified)
pub const DEFAULT_ALTERNATE_STATUS: u16 = 304;

/// Default name of the cache-busting query parameter
pub const DEFAULT_CACHE_BUST_PARAM: &str = "_cb";

const ENV_MAX_ATTEMPTS: &str = "STEADYPAGE_MAX_ATTEMPTS";
const ENV_ATTEMPT_TIMEOUT_MS: &str = "STEADYPAGE_ATTEMPT_TIMEOUT_MS";
const ENV_RELOAD_TIMEOUT_MS: &str = "STEADYPAGE_RELOAD_TIMEOUT_MS";
const ENV_SETTLE_DELAY_MS: &str = "STEADYPAGE_SETTLE_DELAY_MS";
const ENV_POLL_INTERVAL_MS: &str = "STEADYPAGE_POLL_INTERVAL_MS";
const ENV_POLL_TIMEOUT_MS: &str = "STEADYPAGE_POLL_TIMEOUT_MS";
const ENV_BLOCKED_DOMAINS: &str = "STEADYPAGE_BLOCKED_DOMAINS";
const ENV_BLOCKED_RESOURCE_TYPES: &str = "STEADYPAGE_BLOCKED_RESOURCE_TYPES";

/// Serializes a `Duration` as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Defaults for [`NavigationRequest`](crate::loader::NavigationRequest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Maximum navigation attempts (at least 1)
    pub max_attempts: u32,

    /// Time budget of one attempt, in milliseconds
    #[serde(rename = "attemptTimeoutMs", with = "millis")]
    pub attempt_timeout: Duration,

    /// Part of the attempt budget kept for the forced reload, in milliseconds
    #[serde(rename = "reloadTimeoutMs", with = "millis")]
    pub reload_timeout: Duration,

    /// Pause after readiness, in milliseconds
    #[serde(rename = "settleDelayMs", with = "millis")]
    pub settle_delay: Duration,

    /// Expected status of the main document
    pub expected_status: u16,

    /// Additional accepted status of the main document
    pub alternate_status: Option<u16>,

    /// Query parameter carrying the cache-bust token
    pub cache_bust_param: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            expected_status: DEFAULT_EXPECTED_STATUS,
            alternate_status: Some(DEFAULT_ALTERNATE_STATUS),
            cache_bust_param: DEFAULT_CACHE_BUST_PARAM.to_string(),
        }
    }
}

/// Defaults for [`PollSpec`](crate::poll::PollSpec)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollConfig {
    /// Pause between evaluations, in milliseconds (must be non-zero)
    #[serde(rename = "intervalMs", with = "millis")]
    pub interval: Duration,

    /// Total time budget, in milliseconds
    #[serde(rename = "timeoutMs", with = "millis")]
    pub timeout: Duration,

    /// Probe failures to swallow before giving up (`None` = until timeout)
    pub max_probe_errors: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            max_probe_errors: None,
        }
    }
}

/// Input for [`NetworkPolicy`](crate::network::NetworkPolicy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Domain substrings whose requests are blocked
    pub blocked_domains: Vec<String>,

    /// Resource types whose requests are blocked
    pub blocked_resource_types: Vec<ResourceType>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            blocked_domains: DEFAULT_BLOCKED_DOMAINS
                .iter()
                .map(|domain| domain.to_string())
                .collect(),
            blocked_resource_types: DEFAULT_BLOCKED_RESOURCE_TYPES.to_vec(),
        }
    }
}

/// All recognized options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuiteConfig {
    pub loader: LoaderConfig,
    pub poll: PollConfig,
    pub network: NetworkConfig,
}

impl SuiteConfig {
    /// Creates a SuiteConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SuiteConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `STEADYPAGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Blocked domains are appended to the current list; blocked resource types
    /// replace it.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.loader.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_ATTEMPT_TIMEOUT_MS) {
            self.loader.attempt_timeout = parse_env_millis(ENV_ATTEMPT_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RELOAD_TIMEOUT_MS) {
            self.loader.reload_timeout = parse_env_millis(ENV_RELOAD_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_SETTLE_DELAY_MS) {
            self.loader.settle_delay = parse_env_millis(ENV_SETTLE_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll.interval = parse_env_millis(ENV_POLL_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_TIMEOUT_MS) {
            self.poll.timeout = parse_env_millis(ENV_POLL_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_BLOCKED_DOMAINS) {
            for domain in split_list(&value) {
                if !self.network.blocked_domains.iter().any(|d| d == domain) {
                    self.network.blocked_domains.push(domain.to_string());
                }
            }
        }
        if let Some(value) = lookup(ENV_BLOCKED_RESOURCE_TYPES) {
            self.network.blocked_resource_types = split_list(&value)
                .map(ResourceType::from_str)
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(())
    }

    /// Rejects values the loader or poller cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.loader.max_attempts == 0 {
            return Err(Error::InvalidArgument(
                "loader.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.loader.reload_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "loader.reloadTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(Error::InvalidArgument(
                "poll.intervalMs must be greater than zero".to_string(),
            ));
        }
        if self.loader.cache_bust_param.is_empty() {
            return Err(Error::InvalidArgument(
                "loader.cacheBustParam must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::InvalidArgument(format!("{} has an invalid value '{}'", key, value))
    })
}

fn parse_env_millis(key: &str, value: &str) -> Result<Duration> {
    parse_env::<u64>(key, value).map(Duration::from_millis)
}
