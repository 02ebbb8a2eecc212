//! Configuration for paperflowd

use crate::error::{DaemonError, DaemonResult};
use paperflow_engine::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted dedup record lifetime, one year
pub const MAX_DEDUP_TTL_SECS: u64 = 366 * 24 * 3600;

/// Main daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Deadline scanner configuration
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Notification delivery configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deadline scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Seconds between scans
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,

    /// Lifetime of a deadline notification dedup record
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,

    /// Scan once right away instead of waiting a full interval
    #[serde(default = "default_true")]
    pub run_on_startup: bool,

    /// Deliveries allowed in flight at once within a sweep
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            dedup_ttl_secs: default_dedup_ttl(),
            run_on_startup: true,
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl ScannerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn dedup_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.dedup_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::seconds(secs.min(i64::MAX / 1000))
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Attempts per notification, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after each failed attempt; the last entry repeats
    #[serde(default = "default_backoff")]
    pub backoff_secs: Vec<u64>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff(),
        }
    }
}

impl NotificationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        )
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    3600
}

fn default_dedup_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_max_in_flight() -> usize {
    16
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> Vec<u64> {
    vec![10, 30, 60]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `PAPERFLOW__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // Add environment variables with PAPERFLOW prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PAPERFLOW")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("notifications.backoff_secs")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> DaemonResult<()> {
        if self.scanner.interval_secs == 0 {
            return Err(DaemonError::Config(
                "scanner.interval_secs must be greater than zero".into(),
            ));
        }
        if self.scanner.dedup_ttl_secs == 0 {
            return Err(DaemonError::Config(
                "scanner.dedup_ttl_secs must be greater than zero".into(),
            ));
        }
        if self.scanner.dedup_ttl_secs > MAX_DEDUP_TTL_SECS {
            return Err(DaemonError::Config(format!(
                "scanner.dedup_ttl_secs must be at most {}",
                MAX_DEDUP_TTL_SECS
            )));
        }
        if self.scanner.max_in_flight == 0 {
            return Err(DaemonError::Config(
                "scanner.max_in_flight must be at least 1".into(),
            ));
        }
        if self.notifications.max_attempts == 0 {
            return Err(DaemonError::Config(
                "notifications.max_attempts must be at least 1".into(),
            ));
        }
        if self.notifications.backoff_secs.is_empty() {
            return Err(DaemonError::Config(
                "notifications.backoff_secs must list at least one delay".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(DaemonError::Config("logging.level must not be empty".into()));
        }
        Ok(())
    }
}
