//! Pipeworks: chainable worker-pool pipelines with backpressure, cooperative
//! cancellation and fault propagation across stages.
//!
//! A [`Pipeline<T, U>`] owns a bounded or unbounded input queue, a pool of worker
//! threads running a transform `T -> U` (plain or async), and an output queue read by
//! exactly one consumer. Stages chain with [`Pipeline::attach_new`],
//! [`Pipeline::attach_new_async`] or [`Pipeline::attach_output_to`]; completion,
//! cancellation and faults flow downstream.
//!
//! ```ignore
//! use pipeworks::{Pipeline, StageOpts};
//!
//! let first = Pipeline::new(|s: String| Ok(format!("{s} sync")), StageOpts::default())?;
//! let last = first.attach_new(|s: String| Ok(s.len()), StageOpts::default().workers(2))?;
//! first.add_all(["1".to_string(), "2".to_string()])?;
//! first.complete_adding();
//! let lens = last.to_list()?.wait()?;
//! ```
//!
//! The `pipeworks` binary built on top hashes every file under a directory.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{PipelineError, Result};
pub use pipeline::{
    AsyncStage, CancelToken, DrainHandle, ItemChannel, Pipeline, StageBehavior, SyncStage,
};
