//! Task lifecycle engine.
//!
//! Four actors coordinate around the relational store and an ordered
//! notification list:
//!
//! ```text
//! Intake ──► Store + Notifier
//!                      │
//!                      ▼
//!                  Consumer ──► Performer ──► Store + web hook endpoint
//!                      ▲
//! Requeuer: Store ─────┘
//! ```
//!
//! The store is the source of truth; the channel is an optimisation for
//! prompt delivery. A task survives an empty channel or a crashed worker
//! (the requeuer republishes once due passes), duplicate notifications are
//! idempotent (the claim admits one performer per attempt), and due always
//! advances past the in-flight execution window before a request is issued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod application;
pub mod backoff;
pub mod cleaner;
pub mod consumer;
pub mod due;
pub mod intake;
pub mod notifier;
pub mod performer;
pub mod requeuer;
pub mod store;
pub mod task;

pub use application::{ApiKey, Application};
pub use backoff::Backoff;
pub use cleaner::Cleaner;
pub use consumer::Consumer;
pub use due::{DuePolicy, StatusPolicy};
pub use intake::{Intake, IntakeError};
pub use notifier::Notifier;
pub use performer::{Outcome, Performer};
pub use requeuer::Requeuer;
pub use store::TaskStore;
pub use task::{NewTask, Task, TaskMethod, TaskStatus};

/// Shared run/shutdown flag propagated to every performer.
///
/// Set while the worker is running; cleared on shutdown. Performers check it
/// between waits and abandon promptly, leaving in-flight tasks for the
/// requeuer.
#[derive(Clone, Debug)]
pub struct ControlFlag {
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl ControlFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    /// Resolves once the flag has been cleared; for use in `select!` around
    /// long sleeps.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await;
    }
}

impl Default for ControlFlag {
    fn default() -> Self {
        Self::new()
    }
}
