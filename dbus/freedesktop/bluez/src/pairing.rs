//! Single-assignment outcome slot bridging an asynchronous pair request to a caller that
//! waits with a deadline.
//!
//! [`outcome_slot`] returns a cloneable [`OutcomeSlot`] handed to both completion
//! callbacks and a [`OutcomeWaiter`] kept by the caller. The first callback to
//! [`OutcomeSlot::record`] stores the outcome and wakes the waiter; later records are
//! ignored.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Result of one pairing attempt as reported by the remote stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Success,
    Failed(String),
}

/// Why [`OutcomeWaiter::wait`] returned without an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline elapsed first.
    Timeout,
    /// Every slot was dropped without recording an outcome.
    Abandoned,
}

#[derive(Clone)]
pub struct OutcomeSlot {
    sender: Arc<Mutex<Option<oneshot::Sender<PairingOutcome>>>>,
}

pub struct OutcomeWaiter {
    receiver: oneshot::Receiver<PairingOutcome>,
}

pub fn outcome_slot() -> (OutcomeSlot, OutcomeWaiter) {
    let (sender, receiver) = oneshot::channel();
    (
        OutcomeSlot {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        OutcomeWaiter { receiver },
    )
}

impl OutcomeSlot {
    /// Records `outcome` if none was recorded yet. Returns whether this call won.
    pub fn record(&self, outcome: PairingOutcome) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // a dropped waiter (timed out) still counts as the slot being filled
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl OutcomeWaiter {
    /// Blocks the current task until an outcome is recorded or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<PairingOutcome, WaitError> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::Timeout),
        }
    }
}
