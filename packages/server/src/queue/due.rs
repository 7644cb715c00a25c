//! Due-date and status policy.
//!
//! Pure functions that derive a task's next due instant and next status from
//! its timeout and retry count. Every code path that writes a task row goes
//! through these, so the scheduling invariant (due is always in the future,
//! bounded by the configured maximum delay) holds on create, claim and
//! conditional update alike.

use chrono::{DateTime, Duration, Utc};

use crate::config::{BackoffAlgorithm, DueConfig};
use crate::queue::backoff::Backoff;
use crate::queue::task::TaskStatus;

/// Computes the instant at which a task becomes eligible for (re)execution.
///
/// The first execution window is `timeout + min_delay` seconds wide;
/// subsequent attempts back off per the configured algorithm, saturating at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct DuePolicy {
    config: DueConfig,
}

impl DuePolicy {
    pub fn new(config: DueConfig) -> Self {
        Self { config }
    }

    /// Next due instant for a task with the given timeout and retry count.
    pub fn due(&self, timeout: i32, retry_count: i32) -> DateTime<Utc> {
        let min_delay = f64::from(self.config.min_delay);
        let max_delay = f64::from(self.config.max_delay);

        let mut backoff = Backoff::new(min_delay).with_max_value(max_delay);
        for _ in 0..retry_count.max(0) {
            match self.config.algorithm {
                BackoffAlgorithm::Linear => backoff.linear(None),
                BackoffAlgorithm::Exponential => backoff.exponential(None),
            };
        }

        let timeout = f64::from(timeout.max(0));
        let delay = (backoff.value() + timeout).min(max_delay);
        Utc::now() + Duration::milliseconds((delay * 1000.0) as i64)
    }
}

/// Chooses a task status from its retry count: pending while within the
/// retry limit, failed once it is exhausted.
#[derive(Debug, Clone)]
pub struct StatusPolicy {
    config: DueConfig,
}

impl StatusPolicy {
    pub fn new(config: DueConfig) -> Self {
        Self { config }
    }

    pub fn status(&self, retry_count: i32) -> TaskStatus {
        if retry_count > self.config.max_retries {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        }
    }
}
