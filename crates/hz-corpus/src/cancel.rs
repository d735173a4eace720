//! Cooperative cancellation shared by the scan driver and its workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// Cloneable cancellation signal.
///
/// Observable two ways: [`is_cancelled`](Self::is_cancelled) for polling, and
/// [`signal`](Self::signal), a channel that becomes ready (disconnected) once
/// cancelled, for use as a `select!` arm next to a blocking send or receive.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Dropping the only sender wakes every receiver.
        self.trigger.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that yields `Err(RecvError)` as soon as the token fires
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_signal_blocks_until_cancelled() {
        let token = CancelToken::new();
        assert!(token.signal().recv_timeout(Duration::from_millis(10)).is_err());
        assert!(!token.is_cancelled());

        let remote = token.clone();
        let handle = std::thread::spawn(move || remote.signal().recv());
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap().is_err());
    }
}
