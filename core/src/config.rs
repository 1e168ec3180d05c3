//! Configuration types for chanstate

use crate::error::StateError;
use crate::traits::StateResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Identifier this process uses when claiming channels; generated when empty
    pub node_id: String,

    /// Data directory for the persistent store
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Compare-and-swap retry policy
    pub retry: RetryConfig,

    /// Keyspace sweep configuration
    pub sweep: SweepConfig,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            retry: RetryConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl StateConfig {
    pub fn from_json(json: &str) -> StateResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StateError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> StateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> StateResult<()> {
        self.retry.validate()?;
        self.sweep.validate()
    }
}

/// Retry policy for conflicting conditional writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum read-transform-write attempts per update
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds
    pub initial_backoff_ms: u64,

    /// Backoff cap, in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff growth per retry
    pub multiplier: f64,

    /// Random fraction (0.0-1.0) of the backoff added as jitter
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            initial_backoff_ms: 1,
            max_backoff_ms: 50,
            multiplier: 2.0,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    /// Retry immediately, without sleeping between attempts
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            jitter_ratio: 0.0,
        }
    }

    /// Backoff before retry number `retry` (0-indexed), without jitter
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_backoff_ms as f64);
        Duration::from_micros((capped * 1000.0) as u64)
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.max_attempts == 0 {
            return Err(StateError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.multiplier < 1.0 {
            return Err(StateError::Config("retry.multiplier must be >= 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(StateError::Config("retry.jitter_ratio must be within 0.0-1.0".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(StateError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Keyspace sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Keys requested per list call
    pub page_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> StateResult<()> {
        if self.page_size == 0 {
            return Err(StateError::Config("sweep.page_size must be at least 1".into()));
        }
        Ok(())
    }
}
