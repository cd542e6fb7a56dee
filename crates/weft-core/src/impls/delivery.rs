//! Delivery executors for listener notifications.
//!
//! - `TokioDelivery`: a dedicated task drains an unbounded channel, so
//!   callbacks never run on the runner's task and never block it.
//! - `InlineDelivery`: runs callbacks immediately on the caller (tests).

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::ports::{DeliveryExecutor, DeliveryTask};

/// Delivers callbacks in order on a dedicated tokio task.
///
/// Must be created inside a tokio runtime. The drain task ends once every
/// clone of the executor has been dropped.
#[derive(Clone)]
pub struct TokioDelivery {
    tx: mpsc::UnboundedSender<DeliveryTask>,
}

impl TokioDelivery {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DeliveryTask>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                run_guarded(task);
            }
        });
        Self { tx }
    }
}

impl DeliveryExecutor for TokioDelivery {
    fn post(&self, task: DeliveryTask) {
        if self.tx.send(task).is_err() {
            warn!("delivery task dropped: executor has shut down");
        }
    }
}

/// Runs callbacks synchronously on the posting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDelivery;

impl DeliveryExecutor for InlineDelivery {
    fn post(&self, task: DeliveryTask) {
        run_guarded(task);
    }
}

// A panicking listener is logged and swallowed; the committed state stands.
fn run_guarded(task: DeliveryTask) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("delivery callback panicked; notification dropped");
    }
}
