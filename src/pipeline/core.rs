//! Pipeline engine: worker pool, supervisor, completion protocol and fault capture.

use log::{debug, warn};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::cancel::CancelToken;
use super::channel::ItemChannel;
use super::stage::{AsyncStage, StageBehavior, SyncStage};
use crate::error::{PipelineError, Result};
use crate::{StageKind, StageOpts};

pub(crate) fn lock<X>(m: &Mutex<X>) -> MutexGuard<'_, X> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Non-owning route from a stage to the stage it feeds, used only to push
/// cancellation and faults downstream.
pub(crate) trait FaultLink: Send + Sync {
    /// `Some(fault)` cancels with that fault; `None` is a plain cancel.
    fn notify(&self, fault: Option<PipelineError>);
}

/// State shared by the handle, the workers, the supervisor and the drain.
pub(crate) struct Shared<T, U> {
    pub(crate) name: String,
    pub(crate) kind: StageKind,
    pub(crate) workers: usize,
    /// Dropped by the supervisor once every worker has exited.
    pub(crate) input: Mutex<Option<Arc<ItemChannel<T>>>>,
    pub(crate) output: Arc<ItemChannel<U>>,
    pub(crate) cancel: CancelToken,
    pub(crate) completed: AtomicBool,
    pub(crate) fault: Mutex<Option<PipelineError>>,
    pub(crate) downstream: Mutex<Option<Box<dyn FaultLink>>>,
    pub(crate) consumer_attached: AtomicBool,
}

impl<T, U> Shared<T, U> {
    fn input_channel(&self) -> Option<Arc<ItemChannel<T>>> {
        lock(&self.input).clone()
    }

    pub(crate) fn fault(&self) -> Option<PipelineError> {
        lock(&self.fault).clone()
    }

    /// Cancel this stage and everything downstream of it. No fault is recorded.
    pub(crate) fn cancel_processing(&self) {
        if self.cancel.cancel() {
            debug!("stage '{}': cancellation requested", self.name);
            self.notify_downstream(None);
        }
    }

    /// Cancel, record `fault` if it is the first one, and pass it downstream.
    pub(crate) fn cancel_with_fault(&self, fault: PipelineError) {
        self.cancel.cancel();
        {
            let mut slot = lock(&self.fault);
            if slot.is_some() {
                debug!("stage '{}': dropping later fault: {}", self.name, fault);
                return;
            }
            warn!("stage '{}': {}", self.name, fault);
            *slot = Some(fault.clone());
        }
        self.notify_downstream(Some(fault));
    }

    fn notify_downstream(&self, fault: Option<PipelineError>) {
        if let Some(link) = lock(&self.downstream).as_ref() {
            link.notify(fault);
        }
    }

    /// Install the downstream link and replay a fault or cancellation that happened before it.
    /// The replay runs under the link lock so a concurrent fault is never missed.
    pub(crate) fn set_downstream(&self, link: Box<dyn FaultLink>) {
        let mut slot = lock(&self.downstream);
        if let Some(fault) = self.fault() {
            link.notify(Some(fault));
        } else if self.cancel.is_cancelled() {
            link.notify(None);
        }
        *slot = Some(link);
    }
}

/// Handle to one pipeline stage. Cloning is cheap and every clone drives the same stage.
///
/// Workers start at construction. Feed items with [`add`](Self::add), finish with
/// [`complete_adding`](Self::complete_adding) and read results with
/// [`consume_output`](Self::consume_output) or [`to_list`](Self::to_list).
///
/// ```ignore
/// use pipeworks::{Pipeline, StageOpts};
///
/// let hash = Pipeline::new(|s: String| Ok(s.len()), StageOpts::named("len").workers(4))?;
/// hash.add_all(["a".to_string(), "bb".to_string()])?;
/// hash.complete_adding();
/// let lens = hash.to_list()?.wait()?;
/// ```
pub struct Pipeline<T, U> {
    pub(crate) shared: Arc<Shared<T, U>>,
}

impl<T, U> Clone for Pipeline<T, U> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static, U: Send + 'static> Pipeline<T, U> {
    /// Synchronous stage: `transform` runs on the worker threads.
    pub fn new<F>(transform: F, opts: StageOpts) -> Result<Self>
    where
        F: Fn(T) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        Self::with_behavior(SyncStage::new(transform), opts)
    }

    /// Asynchronous stage: each worker awaits one future from `transform` at a time.
    pub fn new_async<F, Fut>(transform: F, opts: StageOpts) -> Result<Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + 'static,
    {
        Self::with_behavior(AsyncStage::new(transform), opts)
    }

    /// Start a stage running any [`StageBehavior`].
    pub fn with_behavior<B>(behavior: B, opts: StageOpts) -> Result<Self>
    where
        B: StageBehavior<T, U>,
    {
        if opts.workers == 0 {
            return Err(PipelineError::InvalidWorkerCount);
        }
        let cancel = CancelToken::new();
        let input = Arc::new(ItemChannel::new(opts.input_capacity, Some(cancel.clone())));
        let shared = Arc::new(Shared {
            name: opts.name,
            kind: behavior.kind(),
            workers: opts.workers,
            input: Mutex::new(Some(Arc::clone(&input))),
            output: Arc::new(ItemChannel::unbounded()),
            cancel,
            completed: AtomicBool::new(false),
            fault: Mutex::new(None),
            downstream: Mutex::new(None),
            consumer_attached: AtomicBool::new(false),
        });

        let behavior: Arc<dyn StageBehavior<T, U>> = Arc::new(behavior);
        let mut handles = Vec::with_capacity(shared.workers);
        for id in 0..shared.workers {
            let worker_shared = Arc::clone(&shared);
            let input = Arc::clone(&input);
            let behavior = Arc::clone(&behavior);
            let spawned = spawn_named(format!("{}-worker-{}", shared.name, id), move || {
                worker_loop(worker_shared, input, behavior)
            });
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // Workers already running see the cancel and exit; nothing else holds them.
                    shared.cancel.cancel();
                    return Err(e);
                }
            }
        }
        drop(input);

        let supervisor_shared = Arc::clone(&shared);
        if let Err(e) = spawn_named(format!("{}-supervisor", shared.name), move || {
            supervise(supervisor_shared, handles)
        }) {
            shared.cancel.cancel();
            return Err(e);
        }

        debug!(
            "stage '{}' started: {} {} worker(s), input capacity {}",
            shared.name,
            shared.workers,
            shared.kind,
            match opts.input_capacity {
                0 => "unbounded".to_string(),
                cap => cap.to_string(),
            }
        );
        Ok(Self { shared })
    }

    /// Enqueue one item. Blocks while a bounded input is full.
    ///
    /// Fails with [`PipelineError::ChannelClosed`] after [`complete_adding`](Self::complete_adding)
    /// and with [`PipelineError::Cancelled`] once the stage is cancelled.
    pub fn add(&self, item: T) -> Result<()> {
        let input = self
            .shared
            .input_channel()
            .ok_or(PipelineError::ChannelClosed)?;
        input.put(item)
    }

    /// Enqueue items in order; stops at the first refused item.
    pub fn add_all<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }
}

impl<T, U> Pipeline<T, U> {
    /// Signal that no more input will be added. Workers exit once the input is drained.
    pub fn complete_adding(&self) {
        if let Some(input) = self.shared.input_channel() {
            input.complete();
        }
    }

    /// Cancel this stage and the stages attached downstream of it.
    ///
    /// Blocked `add` calls and idle workers wake immediately. A transform already running
    /// finishes its current item; remaining items are left unprocessed.
    pub fn cancel_processing(&self) {
        self.shared.cancel_processing();
    }

    /// True once every worker exited and the output channel is closed.
    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// The captured fault, if any. It is also returned by the output drain.
    pub fn fault(&self) -> Option<PipelineError> {
        self.shared.fault()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> StageKind {
        self.shared.kind
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers
    }

    /// Items waiting in the input queue; 0 once the stage has completed.
    pub fn pending_input(&self) -> usize {
        self.shared.input_channel().map_or(0, |c| c.len())
    }
}

pub(crate) fn spawn_named<F, R>(name: String, f: F) -> Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| PipelineError::Spawn {
            thread: name,
            reason: e.to_string(),
        })
}

/// One worker: pull, transform, push until the input ends or the stage is cancelled.
fn worker_loop<T: 'static, U: 'static>(
    shared: Arc<Shared<T, U>>,
    input: Arc<ItemChannel<T>>,
    behavior: Arc<dyn StageBehavior<T, U>>,
) {
    for item in input.consume() {
        let processed = catch_unwind(AssertUnwindSafe(|| behavior.process(item)));
        match processed {
            Ok(Ok(out)) => {
                if let Err(e) = shared.output.put(out) {
                    debug!("stage '{}': output refused: {}", shared.name, e);
                    break;
                }
            }
            Ok(Err(err)) => {
                shared.cancel_with_fault(PipelineError::transform(&shared.name, err));
                break;
            }
            Err(_) => {
                shared.cancel_with_fault(PipelineError::WorkerPanicked {
                    stage: shared.name.clone(),
                });
                break;
            }
        }
    }
}

/// Join all workers, then close output, mark completed and release the input.
fn supervise<T, U>(shared: Arc<Shared<T, U>>, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            shared.cancel_with_fault(PipelineError::WorkerPanicked {
                stage: shared.name.clone(),
            });
        }
    }
    shared.output.complete();
    shared.completed.store(true, Ordering::SeqCst);
    lock(&shared.input).take();
    debug!(
        "stage '{}' completed{}",
        shared.name,
        if shared.cancel.is_cancelled() {
            " (cancelled)"
        } else {
            ""
        }
    );
}
