//! Overdue-task scanner: re-publishes notifications the fast path missed.
//!
//! Catches tasks stranded by a crash between intake commit and notification,
//! or by a performer that never recorded a terminal state. Duplicates are
//! harmless: the claim admits at most one performer per attempt.

use std::time::Instant;

use tracing::{debug, warn};

use crate::config::RequeuerConfig;
use crate::queue::notifier::Notifier;
use crate::queue::store::TaskStore;
use crate::queue::ControlFlag;

pub struct Requeuer {
    store: TaskStore,
    notifier: Notifier,
    config: RequeuerConfig,
    flag: ControlFlag,
}

impl Requeuer {
    pub fn new(
        store: TaskStore,
        notifier: Notifier,
        config: RequeuerConfig,
        flag: ControlFlag,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            flag,
        }
    }

    pub async fn run(&self) {
        while self.flag.is_set() {
            let started = Instant::now();
            self.tick().await;
            if let Some(slack) = self.config.interval.checked_sub(started.elapsed()) {
                tokio::select! {
                    _ = self.flag.cancelled() => break,
                    _ = tokio::time::sleep(slack) => {}
                }
            }
        }
    }

    /// One scan: query overdue pending tasks and push each back onto the
    /// channel. Store and channel errors are absorbed; the next tick
    /// retries.
    pub async fn tick(&self) {
        let tasks = match self.store.get_due_tasks(self.config.limit, 0).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "due-task query failed");
                return;
            }
        };

        if !tasks.is_empty() {
            debug!(count = tasks.len(), "republishing overdue tasks");
        }

        for task in tasks {
            if let Err(e) = self
                .notifier
                .push_tail(&self.config.channel, &task.instruction())
                .await
            {
                warn!(task_id = task.id, error = %e, "failed to republish task");
            }
            tokio::time::sleep(self.config.delay).await;
        }
    }
}
