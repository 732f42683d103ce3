//! Stage behaviors: what a worker does with one item.

use anyhow::Result;
use std::future::Future;
use std::marker::PhantomData;

use crate::StageKind;

/// Per-item behavior run by every worker of a stage.
///
/// Implementations are shared by all workers of the stage and called concurrently.
/// Returning `Err` faults the stage: it is cancelled, the error is captured and the
/// downstream chain is notified.
pub trait StageBehavior<T, U>: Send + Sync + 'static {
    /// Turn one input item into one output item.
    fn process(&self, item: T) -> Result<U>;

    /// Kind reported in logs.
    fn kind(&self) -> StageKind {
        StageKind::Sync
    }
}

/// Applies a plain function per item.
pub struct SyncStage<F> {
    transform: F,
}

impl<F> SyncStage<F> {
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

impl<T, U, F> StageBehavior<T, U> for SyncStage<F>
where
    F: Fn(T) -> Result<U> + Send + Sync + 'static,
{
    fn process(&self, item: T) -> Result<U> {
        (self.transform)(item)
    }
}

/// Applies a function returning a future and parks the worker until it settles,
/// so each worker has at most one future in flight.
pub struct AsyncStage<F, Fut> {
    transform: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncStage<F, Fut> {
    pub fn new(transform: F) -> Self {
        Self {
            transform,
            _fut: PhantomData,
        }
    }
}

impl<T, U, F, Fut> StageBehavior<T, U> for AsyncStage<F, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U>> + 'static,
{
    fn process(&self, item: T) -> Result<U> {
        futures::executor::block_on((self.transform)(item))
    }

    fn kind(&self) -> StageKind {
        StageKind::Async
    }
}
