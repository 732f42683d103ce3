//! Chaining: feed one stage's output into the next stage's input.

use log::debug;
use std::future::Future;
use std::sync::{Arc, Weak};

use super::core::{FaultLink, Pipeline, Shared};
use crate::StageOpts;
use crate::error::{PipelineError, Result};

/// Downstream stages are held weakly: the link only delivers notifications and never
/// keeps the next stage alive.
impl<X, Y> FaultLink for Weak<Shared<X, Y>>
where
    X: Send + 'static,
    Y: Send + 'static,
{
    fn notify(&self, fault: Option<PipelineError>) {
        let Some(shared) = self.upgrade() else {
            return;
        };
        match fault {
            Some(fault) => shared.cancel_with_fault(fault),
            None => shared.cancel_processing(),
        }
    }
}

impl<T: Send + 'static, U: Send + 'static> Pipeline<T, U> {
    /// Build a synchronous stage fed by this stage's output and return it.
    pub fn attach_new<V, F>(&self, transform: F, opts: StageOpts) -> Result<Pipeline<U, V>>
    where
        V: Send + 'static,
        F: Fn(U) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        let next = Pipeline::new(transform, opts)?;
        self.attach_or_discard(next)
    }

    /// Build an asynchronous stage fed by this stage's output and return it.
    pub fn attach_new_async<V, F, Fut>(
        &self,
        transform: F,
        opts: StageOpts,
    ) -> Result<Pipeline<U, V>>
    where
        V: Send + 'static,
        F: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + 'static,
    {
        let next = Pipeline::new_async(transform, opts)?;
        self.attach_or_discard(next)
    }

    fn attach_or_discard<V: Send + 'static>(&self, next: Pipeline<U, V>) -> Result<Pipeline<U, V>> {
        if let Err(e) = self.attach_output_to(&next) {
            // Nobody else can reach `next`; stop its workers.
            next.cancel_processing();
            return Err(e);
        }
        Ok(next)
    }

    /// Forward every output item into `destination`, then complete its input.
    ///
    /// `destination` also becomes the target of this stage's cancellation and faults.
    /// This claims the output consumer slot, so it fails with
    /// [`PipelineError::ConsumerAlreadyAttached`] if the output is already being read.
    pub fn attach_output_to<V: Send + 'static>(&self, destination: &Pipeline<U, V>) -> Result<()> {
        self.claim_consumer()?;
        self.shared
            .set_downstream(Box::new(Arc::downgrade(&destination.shared)));

        let dest = destination.clone();
        let from = self.shared.name.clone();
        // Forwarding runs detached: a fault here has already been passed to `dest`
        // through the link, and `dest`'s own drain reports it.
        let _detached = self.spawn_drain(move |items| {
            let mut refused = 0_usize;
            for item in items {
                if dest.add(item).is_err() {
                    refused += 1;
                }
            }
            if refused > 0 {
                debug!(
                    "stage '{}' -> '{}': {} item(s) dropped, downstream no longer accepting",
                    from,
                    dest.name(),
                    refused
                );
            }
            dest.complete_adding();
        })?;
        debug!(
            "stage '{}' attached to '{}'",
            self.shared.name, destination.shared.name
        );
        Ok(())
    }
}
