//! Focus Manager
//!
//! Stand-in for window focus and visibility events. The embedding
//! application reports focus changes; query handles that opted into
//! refetch-on-focus listen for them.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::trace;

const FOCUS_CHANNEL_CAPACITY: usize = 16;

// == Focus Manager ==
#[derive(Debug)]
pub struct FocusManager {
    focused: AtomicBool,
    tx: broadcast::Sender<()>,
}

impl FocusManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self {
            focused: AtomicBool::new(true),
            tx,
        }
    }

    /// Records a focus change. Emits a focus event on a blur-to-focus
    /// transition only.
    pub fn set_focused(&self, focused: bool) {
        let was_focused = self.focused.swap(focused, Ordering::SeqCst);
        if focused && !was_focused {
            self.emit();
        }
    }

    /// Emits a focus event unconditionally.
    pub fn focus(&self) {
        self.focused.store(true, Ordering::SeqCst);
        self.emit();
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    fn emit(&self) {
        if self.tx.send(()).is_err() {
            trace!("no focus listeners registered");
        }
    }
}

impl Default for FocusManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_focus_emits_event() {
        let manager = FocusManager::new();
        let mut rx = manager.subscribe();

        manager.focus();
        assert!(rx.try_recv().is_ok());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_set_focused_emits_on_transition_only() {
        let manager = FocusManager::new();
        let mut rx = manager.subscribe();

        manager.set_focused(true);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        manager.set_focused(false);
        assert!(!manager.is_focused());
        manager.set_focused(true);
        assert!(rx.try_recv().is_ok());
    }
}
