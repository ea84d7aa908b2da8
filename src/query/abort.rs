//! Abort Signals
//!
//! Cooperative cancellation handed to fetch functions. The coordinator checks
//! the signal itself before committing a result, so a fetch function that
//! ignores it is still discarded.

use tokio::sync::watch;

// == Abort Controller ==
/// Owner side of an abort signal.
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Aborts every signal handed out by this controller. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

// == Abort Signal ==
/// Observer side of an abort controller.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is aborted.
    ///
    /// If the controller is dropped without aborting, this never resolves.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|aborted| *aborted).await.map(|_| ()).is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
