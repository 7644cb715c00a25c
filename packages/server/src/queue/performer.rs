//! Web-hook delivery: claim an attempt, issue the outbound request, record
//! the outcome.
//!
//! The claim is the idempotency point. Only one performer can claim a given
//! (id, retry_count) pair, so duplicate notifications for the same attempt
//! find the row already advanced and return without side effect.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::PerformerConfig;
use crate::queue::backoff::Backoff;
use crate::queue::store::TaskStore;
use crate::queue::task::Task;
use crate::queue::ControlFlag;

// Completion-polling sleep intervals: 0.1s growing by 1.5x, capped at 2s.
const POLL_START: f64 = 0.1;
const POLL_FACTOR: f64 = 1.5;
const POLL_CAP: f64 = 2.0;

/// Terminal disposition of one performer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Rescheduled,
    Failed,
}

/// Claims tasks and delivers them to their web-hook endpoints.
pub struct Performer {
    store: TaskStore,
    client: Client,
    config: PerformerConfig,
}

impl Performer {
    pub fn new(store: TaskStore, client: Client, config: PerformerConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Perform the attempt named by an `"<id>:<retry_count>"` instruction.
    ///
    /// Returns None when the instruction is malformed, the attempt was
    /// already claimed, or another worker recorded the outcome first.
    pub async fn perform(&self, instruction: &str, flag: &ControlFlag) -> Option<Outcome> {
        let Some((task_id, retry_count)) = parse_instruction(instruction) else {
            warn!(instruction, "discarding malformed instruction");
            return None;
        };

        let task = match self.store.claim(task_id, retry_count).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!(task_id, retry_count, "attempt already claimed");
                return None;
            }
            Err(e) => {
                warn!(task_id, retry_count, error = %e, "claim failed");
                return None;
            }
        };

        let code = self.deliver(&task, retry_count, flag).await;

        // No response (network error, abandoned wait, cancellation) counts
        // as a transient server error.
        let code = code.unwrap_or(500);
        let result = if code < 202 {
            (Outcome::Completed, self.store.complete(&task).await)
        } else if code >= 500 || self.config.transient_codes.contains(&code) {
            (Outcome::Rescheduled, self.store.reschedule(&task).await)
        } else {
            (Outcome::Failed, self.store.fail(&task).await)
        };

        let (outcome, updated) = result;
        match updated {
            Ok(true) => {
                info!(
                    task_id,
                    retry_count,
                    code,
                    outcome = ?outcome,
                    url = %task.url,
                    "task attempt finished"
                );
                Some(outcome)
            }
            Ok(false) => {
                info!(task_id, retry_count, "another worker has advanced the task");
                None
            }
            Err(e) => {
                warn!(task_id, retry_count, error = %e, "failed to record task outcome");
                None
            }
        }
    }

    /// Issue the outbound request on a sub-task and wait cooperatively,
    /// checking the control flag between exponentially growing sleeps.
    ///
    /// Returns the response status code, or None when no response was
    /// obtained before the wait was abandoned.
    async fn deliver(&self, task: &Task, retry_count: i32, flag: &ControlFlag) -> Option<u16> {
        let headers = self.outbound_headers(task, retry_count);
        let request = self
            .client
            .request(task.method.into(), &task.url)
            .headers(headers)
            .body(task.body.clone())
            .timeout(Duration::from_secs(task.timeout.max(0) as u64));

        let url = task.url.clone();
        let mut handle = tokio::spawn(async move {
            match request.send().await {
                Ok(response) => Some(response.status().as_u16()),
                Err(e) => {
                    warn!(url = %url, error = %e, "web hook request failed");
                    None
                }
            }
        });

        let mut delay = POLL_START;
        let mut backoff = Backoff::new(POLL_START).with_max_value(POLL_CAP);
        while flag.is_set() {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            if handle.is_finished() {
                return (&mut handle).await.ok().flatten();
            }
            delay = backoff.exponential(Some(POLL_FACTOR));
        }

        // Shutdown: the sub-task may still finish in the background but its
        // result is ignored; the requeuer republishes once due passes.
        None
    }

    fn outbound_headers(&self, task: &Task, retry_count: i32) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in task.header_pairs() {
            let parsed = (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(&value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(task_id = task.id, header = %name, "skipping invalid pass-through header"),
            }
        }

        let content_type = format!("{}; charset={}", task.enctype, task.charset);
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert("content-type", value);
        }
        headers.insert("ntorque-task-id", HeaderValue::from(task.id));
        headers.insert("ntorque-task-retry-count", HeaderValue::from(retry_count));
        headers.insert(
            "ntorque-task-retry-limit",
            HeaderValue::from(self.config.retry_limit),
        );
        headers
    }
}

fn parse_instruction(instruction: &str) -> Option<(i64, i32)> {
    let (id, retry_count) = instruction.split_once(':')?;
    Some((id.parse().ok()?, retry_count.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instruction() {
        assert_eq!(parse_instruction("42:0"), Some((42, 0)));
        assert_eq!(parse_instruction("7:13"), Some((7, 13)));
        assert_eq!(parse_instruction("42"), None);
        assert_eq!(parse_instruction("a:b"), None);
        assert_eq!(parse_instruction("42:"), None);
        assert_eq!(parse_instruction(""), None);
    }

    #[test]
    fn test_poll_intervals_grow_to_cap() {
        let mut backoff = Backoff::new(POLL_START).with_max_value(POLL_CAP);
        let mut intervals = vec![POLL_START];
        for _ in 0..8 {
            intervals.push(backoff.exponential(Some(POLL_FACTOR)));
        }
        assert_eq!(intervals[0], 0.1);
        assert!((intervals[1] - 0.15).abs() < 1e-9);
        assert!((intervals[2] - 0.225).abs() < 1e-9);
        assert_eq!(*intervals.last().unwrap(), POLL_CAP);
    }
}
