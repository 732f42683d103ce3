//! Error taxonomy for the pipeline engine.

use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by channels, stages and drains.
///
/// `Clone` so a captured fault can be handed to every downstream stage of a chain.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Put on a channel that was already completed (e.g. `add` after `complete_adding`)
    #[error("channel is closed: no more items can be added")]
    ChannelClosed,

    /// A second output consumer was requested
    #[error("output consumer is already attached")]
    ConsumerAlreadyAttached,

    /// A blocking operation was interrupted by cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// The user transform failed; first failure per pipeline wins
    #[error("transform failed in stage '{stage}': {cause:#}")]
    TransformFault {
        stage: String,
        cause: Arc<anyhow::Error>,
    },

    /// A stage needs at least one worker
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// A worker thread panicked while running the transform
    #[error("worker thread panicked in stage '{stage}'")]
    WorkerPanicked { stage: String },

    /// The drain thread panicked (usually a panicking consumer callback)
    #[error("output drain thread panicked")]
    DrainPanicked,

    /// The OS refused to start a worker, supervisor or drain thread
    #[error("failed to spawn thread '{thread}': {reason}")]
    Spawn { thread: String, reason: String },
}

impl PipelineError {
    pub(crate) fn transform(stage: &str, err: anyhow::Error) -> Self {
        PipelineError::TransformFault {
            stage: stage.to_string(),
            cause: Arc::new(err),
        }
    }

    /// True for faults that get captured and re-raised at drain time.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            PipelineError::TransformFault { .. } | PipelineError::WorkerPanicked { .. }
        )
    }
}
