//! One-shot broadcast cancellation signal.
//!
//! The flag answers polls; the companion channel wakes threads parked in `select!`.
//! Nothing is ever sent on it: dropping the only sender disconnects every receiver,
//! which makes `recv` ready for all of them at once.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct CancelState {
    flag: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

/// Shared cancellation token. Clones observe the same signal.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            state: Arc::new(CancelState {
                flag: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                wake_rx: rx,
            }),
        }
    }

    /// Trigger cancellation. Returns true only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        let first = !self.state.flag.swap(true, Ordering::SeqCst);
        if first && let Ok(mut trigger) = self.state.trigger.lock() {
            trigger.take();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once cancelled. For use in `select!`.
    pub fn wake(&self) -> &Receiver<()> {
        &self.state.wake_rx
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
