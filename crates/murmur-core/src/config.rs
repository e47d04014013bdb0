//! Node configuration
//!
//! Values come from (lowest to highest precedence) built-in defaults, a TOML
//! file, `MURMUR_*` environment variables, and finally CLI flags applied by
//! the binary through [`NodeConfig::set_from_string`].

use crate::effects::RetryPolicy;
use crate::errors::{MurmurError, Result};
use crate::identifiers::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "MURMUR_";

/// Fan-out strategy a node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Flood every new message to topology neighbors
    #[default]
    Flood,
    /// Forward to a leader that periodically fans out batches
    LeaderBatch,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Flood => f.write_str("flood"),
            StrategyKind::LeaderBatch => f.write_str("leader-batch"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "flood" => Ok(StrategyKind::Flood),
            "leader_batch" | "batch" => Ok(StrategyKind::LeaderBatch),
            other => Err(MurmurError::config(format!("unknown strategy `{other}`"))),
        }
    }
}

/// Outbound retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per destination
    pub max_attempts: u32,
    /// Upper bound on one attempt
    pub attempt_timeout_ms: u64,
    /// Linear backoff unit: attempt `i` is followed by `i` units of sleep
    pub backoff_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            attempt_timeout_ms: 1_000,
            backoff_unit_ms: 1_000,
        }
    }
}

impl RetryConfig {
    /// Linear retry policy described by this configuration
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::linear()
            .with_max_attempts(self.max_attempts)
            .with_backoff_unit(Duration::from_millis(self.backoff_unit_ms))
            .with_attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
    }
}

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fan-out strategy
    pub strategy: StrategyKind,
    /// Statically designated leader for the leader-batch strategy
    pub leader: NodeId,
    /// Interval between leader batch flushes
    pub flush_interval_ms: u64,
    /// Grace period given to in-flight sends at shutdown
    pub shutdown_grace_ms: u64,
    /// Outbound retry settings
    pub retry: RetryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Flood,
            leader: NodeId::from("n0"),
            flush_interval_ms: 200,
            shutdown_grace_ms: 2_000,
            retry: RetryConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MurmurError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MurmurError::config(format!("invalid TOML: {e}")))
    }

    /// Apply `MURMUR_*` environment overrides
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs using the `MURMUR_*` naming scheme.
    ///
    /// `MURMUR_FLUSH_INTERVAL_MS` sets `flush_interval_ms`, `MURMUR_RETRY_MAX_ATTEMPTS`
    /// sets `retry.max_attempts`. Unrelated variables are ignored.
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            let key = match key.strip_prefix("retry_") {
                Some(rest) => format!("retry.{rest}"),
                None => key,
            };
            self.set_from_string(&key, &value)?;
        }
        Ok(())
    }

    /// Set a configuration value from a string (for env and CLI parsing)
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "strategy" => self.strategy = value.parse()?,
            "leader" => self.leader = NodeId::new(value.trim()),
            "flush_interval_ms" => self.flush_interval_ms = parse_number(key, value)?,
            "shutdown_grace_ms" => self.shutdown_grace_ms = parse_number(key, value)?,
            "retry.max_attempts" => self.retry.max_attempts = parse_number(key, value)?,
            "retry.attempt_timeout_ms" => {
                self.retry.attempt_timeout_ms = parse_number(key, value)?;
            }
            "retry.backoff_unit_ms" => self.retry.backoff_unit_ms = parse_number(key, value)?,
            other => {
                return Err(MurmurError::config(format!(
                    "unknown configuration key `{other}`"
                )))
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.leader.as_str().is_empty() {
            return Err(MurmurError::config("leader must not be empty"));
        }
        if self.flush_interval_ms == 0 {
            return Err(MurmurError::config("flush_interval_ms must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(MurmurError::config("retry.max_attempts must be positive"));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(MurmurError::config(
                "retry.attempt_timeout_ms must be positive",
            ));
        }
        Ok(())
    }

    /// Interval between batch flushes
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Shutdown drain window
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Retry policy for outbound sends
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MurmurError::config(format!("invalid value `{value}` for `{key}`: {e}")))
}
