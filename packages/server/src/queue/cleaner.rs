//! Janitor: periodically deletes tasks past the retention window.

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::config::CleanerConfig;
use crate::queue::store::TaskStore;
use crate::queue::ControlFlag;

pub struct Cleaner {
    store: TaskStore,
    config: CleanerConfig,
    flag: ControlFlag,
}

impl Cleaner {
    pub fn new(store: TaskStore, config: CleanerConfig, flag: ControlFlag) -> Self {
        Self {
            store,
            config,
            flag,
        }
    }

    pub async fn run(&self) {
        let retention = Duration::days(self.config.after_days);

        while self.flag.is_set() {
            match self.store.delete_tasks_older_than(retention).await {
                Ok(0) => debug!("no tasks past retention"),
                Ok(count) => info!(count, "deleted old tasks"),
                Err(e) => warn!(error = %e, "task cleanup failed"),
            }
            tokio::select! {
                _ = self.flag.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}
