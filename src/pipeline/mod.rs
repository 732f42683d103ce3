//! Pipeline engine: channels, cancellation, stages, chaining and output drains.

pub mod attach;
pub mod cancel;
pub mod channel;
pub mod core;
pub mod drain;
pub mod stage;

pub use cancel::CancelToken;
pub use channel::{Consume, ItemChannel};
pub use core::Pipeline;
pub use drain::DrainHandle;
pub use stage::{AsyncStage, StageBehavior, SyncStage};
