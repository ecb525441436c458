//! Single-assignment completion latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Delivers exactly one value to a waiting receiver, no matter how many
/// producers race to complete it.
///
/// The first `complete` call wins the compare-and-set and sends its value;
/// every later call returns `false` and drops its value.
pub struct CompletionLatch<T> {
    completed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionLatch<T> {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            completed: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        });
        (latch, rx)
    }

    /// Returns `true` only for the call that actually completed the latch.
    pub fn complete(&self, value: T) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(value);
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}
