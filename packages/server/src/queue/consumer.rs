//! Notification consumer: blocking pop loop that spawns performers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::queue::notifier::Notifier;
use crate::queue::performer::Performer;
use crate::queue::ControlFlag;

/// Pops instructions off the notification channels and hands each to a
/// freshly spawned performer task.
///
/// Performers are not awaited; backpressure comes from the pop rate and the
/// outbound connection pool, not from this loop.
pub struct Consumer {
    notifier: Notifier,
    performer: Arc<Performer>,
    config: ConsumerConfig,
    flag: ControlFlag,
}

impl Consumer {
    pub fn new(
        notifier: Notifier,
        performer: Arc<Performer>,
        config: ConsumerConfig,
        flag: ControlFlag,
    ) -> Self {
        Self {
            notifier,
            performer,
            config,
            flag,
        }
    }

    pub async fn run(&self) {
        info!(channels = ?self.config.channels, "consumer starting");

        while self.flag.is_set() {
            match self
                .notifier
                .block_pop_head(&self.config.channels, self.config.timeout)
                .await
            {
                Ok(Some((channel, instruction))) => {
                    debug!(%channel, %instruction, "spawning performer");
                    let performer = self.performer.clone();
                    let flag = self.flag.clone();
                    tokio::spawn(async move {
                        performer.perform(&instruction, &flag).await;
                    });
                    // Smooth burst arrival before popping again.
                    tokio::time::sleep(self.config.connect_delay).await;
                }
                // Pop timeout: loop around for a liveness check.
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "notification pop failed");
                    tokio::select! {
                        _ = self.flag.cancelled() => {}
                        _ = tokio::time::sleep(self.config.timeout) => {}
                    }
                }
            }
        }

        info!("consumer stopped");
    }
}
