//! Audit engine contracts
//!
//! Data model shared by the engine and its adapters: inventory targets, the
//! check catalog, observations, results and the run summary.

mod catalog;
mod inventory;
mod result;
mod summary;

pub use catalog::*;
pub use inventory::*;
pub use result::*;
pub use summary::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution options for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Bound on a single channel invocation
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,

    /// Retries after a connection or timeout failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Maximum in-flight channel invocations
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for the whole run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,

    #[serde(default)]
    pub report_type: ReportType,
}

fn default_check_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    10
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            check_timeout_ms: default_check_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff(),
            concurrency: default_concurrency(),
            run_timeout_ms: None,
            report_type: ReportType::default(),
        }
    }
}

impl AuditOptions {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let millis = self.retry_backoff_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64).max(0.0) as u64)
    }

    /// Pool size, never zero
    pub fn pool_size(&self) -> usize {
        self.concurrency.max(1)
    }
}
