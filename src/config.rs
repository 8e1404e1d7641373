use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RunError};
use crate::latency_grade::LatencyThresholds;
use crate::prober::{DEFAULT_TCP_PORT, ProberKind};

/// Per-attempt timeout and retry budget, shared read-only by every probe task of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Attempts a task makes before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Twice the number of logical CPUs.
pub fn default_max_threads() -> usize {
    num_cpus::get().saturating_mul(2)
}

/// `min(configured, max_threads)` where a `max_threads` of 0 means [`default_max_threads`].
pub fn effective_concurrency(configured: usize, max_threads: usize) -> Result<usize, RunError> {
    let cap = if max_threads == 0 {
        default_max_threads()
    } else {
        max_threads
    };

    match configured.min(cap) {
        0 => Err(RunError::InvalidConcurrency(configured)),
        limit => Ok(limit),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub concurrency: usize,
    /// 0 selects twice the CPU count.
    pub max_threads: usize,
    pub prober: ProberKind,
    pub tcp_port: u16,
    pub good_threshold_ms: u64,
    pub medium_threshold_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let thresholds = LatencyThresholds::default();
        Self {
            timeout_ms: 2000,
            max_retries: 1,
            retry_delay_ms: 0,
            concurrency: 64,
            max_threads: 0,
            prober: ProberKind::Auto,
            tcp_port: DEFAULT_TCP_PORT,
            good_threshold_ms: thresholds.good_below_ms,
            medium_threshold_ms: thresholds.medium_below_ms,
        }
    }
}

impl AppConfig {
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("RelayProbe");

        fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("config.json"))
    }

    /// Loads the user config, falling back to defaults when it is missing or unreadable.
    pub fn load() -> Self {
        match Self::get_config_path() {
            Ok(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("ignoring config at {}: {e}", path.display());
                AppConfig::default()
            }),
            Ok(_) => AppConfig::default(),
            Err(e) => {
                warn!("no config directory: {e}");
                AppConfig::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str::<AppConfig>(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.medium_threshold_ms <= self.good_threshold_ms {
            return Err(ConfigError::Thresholds {
                good: self.good_threshold_ms,
                medium: self.medium_threshold_ms,
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.timeout_ms), self.max_retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }

    pub fn thresholds(&self) -> LatencyThresholds {
        LatencyThresholds {
            good_below_ms: self.good_threshold_ms,
            medium_below_ms: self.medium_threshold_ms,
        }
    }

    pub fn concurrency_limit(&self) -> Result<usize, RunError> {
        effective_concurrency(self.concurrency, self.max_threads)
    }
}
