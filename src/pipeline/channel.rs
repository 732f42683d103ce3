//! Item channel: crossbeam MPMC queue with an explicit completion signal and
//! cancellation-aware blocking.

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::cancel::CancelToken;
use crate::error::{PipelineError, Result};

/// Thread-safe queue between pipeline stages.
///
/// Completion drops the producer-side sender; readers see the disconnect once the
/// buffered items are gone. A channel built with a [`CancelToken`] also stops
/// blocking (both `put` and `consume`) when the token fires.
pub struct ItemChannel<X> {
    tx: Mutex<Option<Sender<X>>>,
    rx: Receiver<X>,
    capacity: usize,
    cancel: Option<CancelToken>,
}

impl<X> ItemChannel<X> {
    /// `capacity == 0` means unbounded.
    pub fn new(capacity: usize, cancel: Option<CancelToken>) -> Self {
        let (tx, rx) = match capacity {
            0 => unbounded(),
            cap => bounded(cap),
        };
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
            cancel,
        }
    }

    /// Unbounded channel that ignores cancellation (stage output side).
    pub fn unbounded() -> Self {
        Self::new(0, None)
    }

    fn sender_slot(&self) -> MutexGuard<'_, Option<Sender<X>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the sender out of the lock so a blocked put never holds it.
    fn sender(&self) -> Result<Sender<X>> {
        self.sender_slot()
            .as_ref()
            .cloned()
            .ok_or(PipelineError::ChannelClosed)
    }

    /// Append an item, blocking while a bounded channel is full.
    pub fn put(&self, item: X) -> Result<()> {
        let tx = self.sender()?;
        let Some(cancel) = &self.cancel else {
            return tx.send(item).map_err(|_| PipelineError::ChannelClosed);
        };
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        select! {
            send(tx, item) -> res => res.map_err(|_| PipelineError::ChannelClosed),
            recv(cancel.wake()) -> _ => Err(PipelineError::Cancelled),
        }
    }

    /// Mark that no more items will be put. Returns false if already completed.
    pub fn complete(&self) -> bool {
        let was_open = self.sender_slot().take().is_some();
        if !was_open {
            log::debug!("complete called on an already completed channel");
        }
        was_open
    }

    /// Single-pass blocking iterator over the remaining items.
    pub fn consume(&self) -> Consume<'_, X> {
        Consume {
            channel: self,
            done: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.sender_slot().is_none()
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Configured capacity; 0 for unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Iterator returned by [`ItemChannel::consume`]. Ends when the channel is completed
/// and drained, or as soon as cancellation is observed.
pub struct Consume<'a, X> {
    channel: &'a ItemChannel<X>,
    done: bool,
}

impl<X> Iterator for Consume<'_, X> {
    type Item = X;

    fn next(&mut self) -> Option<X> {
        if self.done {
            return None;
        }
        let rx = &self.channel.rx;
        let item = match &self.channel.cancel {
            None => rx.recv().ok(),
            Some(cancel) if cancel.is_cancelled() => None,
            Some(cancel) => select! {
                recv(rx) -> msg => msg.ok(),
                recv(cancel.wake()) -> _ => None,
            },
        };
        if item.is_none() {
            self.done = true;
        }
        item
    }
}
