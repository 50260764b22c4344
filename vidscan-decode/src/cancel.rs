//! Cooperative cancellation shared by the producer, queue and reaper

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    cancelled: AtomicBool,
    // Dropped on cancel; every receiver clone then reports disconnection
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cloneable one-shot cancellation signal.
///
/// Blocking operations wait on [`CancelToken::signal`] inside a
/// `crossbeam::select!`; it becomes ready (disconnected) once cancelled.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("cancellation requested");
        }
        self.inner.trigger.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that never yields a value and disconnects on cancellation
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until cancelled
    pub fn wait(&self) {
        let _ = self.inner.signal.recv();
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_signal_disconnects_on_cancel() {
        let token = CancelToken::new();
        assert!(token
            .signal()
            .recv_timeout(Duration::from_millis(10))
            .unwrap_err()
            .is_timeout());

        token.cancel();
        assert!(token
            .signal()
            .recv_timeout(Duration::from_millis(10))
            .unwrap_err()
            .is_disconnected());
    }

    #[test]
    fn test_wait_wakes_other_thread() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait())
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        waiter.join().unwrap();
    }
}
