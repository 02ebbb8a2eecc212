//! Paperflow Daemon library
//!
//! This module provides the core components for the paperflow daemon:
//! - Layered configuration (defaults, file, environment)
//! - Logging bootstrap
//! - Service wiring for the stage engine and the deadline scanner
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod service;

pub use config::{
    DaemonConfig, LoggingConfig, NotificationConfig, ScannerConfig, MAX_DEDUP_TTL_SECS,
};
pub use error::{DaemonError, DaemonResult};
pub use logging::init_logging;
pub use service::{shutdown_signal, Daemon};
