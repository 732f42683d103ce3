//! Output consumption: the single drain allowed per stage.

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use super::core::{Pipeline, spawn_named};
use crate::error::{PipelineError, Result};

/// An in-progress drain of a stage's output.
///
/// [`wait`](Self::wait) returns once the output channel is closed. If the stage (or a
/// stage upstream of it) captured a fault, `wait` returns that fault after every
/// produced item has gone through the drain.
pub struct DrainHandle<R> {
    handle: JoinHandle<Result<R>>,
    done_rx: Receiver<()>,
}

impl<R: Send + 'static> DrainHandle<R> {
    fn spawn<F>(name: String, f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        let (done_tx, done_rx) = bounded::<()>(1);
        let handle = spawn_named(name, move || {
            let out = f();
            let _ = done_tx.send(());
            out
        })?;
        Ok(Self { handle, done_rx })
    }
}

impl<R> DrainHandle<R> {
    /// Block until the drain finishes.
    pub fn wait(self) -> Result<R> {
        self.handle
            .join()
            .map_err(|_| PipelineError::DrainPanicked)?
    }

    /// Wait at most `timeout`. On timeout the handle is given back so the caller can
    /// cancel the pipeline and wait again for the partial result.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<R>, Self> {
        match self.done_rx.recv_timeout(timeout) {
            // Disconnected: the drain thread is gone (finished or panicked).
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(self.wait()),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T: Send + 'static, U: Send + 'static> Pipeline<T, U> {
    pub(crate) fn claim_consumer(&self) -> Result<()> {
        if self.shared.consumer_attached.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::ConsumerAlreadyAttached);
        }
        Ok(())
    }

    /// Run `f` over the output on a drain thread, then surface the captured fault.
    /// Caller must have claimed the consumer slot.
    pub(crate) fn spawn_drain<R, F>(&self, f: F) -> Result<DrainHandle<R>>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Iterator<Item = U>) -> R + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        DrainHandle::spawn(format!("{}-drain", shared.name), move || {
            let out = f(&mut shared.output.consume());
            match shared.fault() {
                Some(fault) => {
                    debug!("stage '{}': drain finished with fault", shared.name);
                    Err(fault)
                }
                None => Ok(out),
            }
        })
    }

    /// Drain the output into `callback`, in delivery order.
    ///
    /// Only one consumer may ever be attached; a second call fails with
    /// [`PipelineError::ConsumerAlreadyAttached`]. The drain does not finish until the stage
    /// completes, so call [`complete_adding`](Self::complete_adding) or
    /// [`cancel_processing`](Self::cancel_processing) at some point.
    pub fn consume_output<F>(&self, mut callback: F) -> Result<DrainHandle<()>>
    where
        F: FnMut(U) + Send + 'static,
    {
        self.claim_consumer()?;
        self.spawn_drain(move |items| items.for_each(&mut callback))
    }

    /// Drain the output into a `Vec`.
    ///
    /// After a plain cancellation the vector holds the partial results. If a fault was
    /// captured, `wait` returns the fault and the partial vector is discarded; use
    /// [`consume_output`](Self::consume_output) to observe partial results in that case.
    pub fn to_list(&self) -> Result<DrainHandle<Vec<U>>> {
        self.claim_consumer()?;
        self.spawn_drain(|items| items.collect())
    }
}
