//! Hashing CLI built on the pipeline engine.

pub mod arg_parser;
pub mod handlers;
pub mod hashing;
pub mod progress;
pub mod tools;
pub mod walk;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use handlers::{apply_cli_to_opts, format_digest, handle_run, resolve_workers};
pub use hashing::{digest_path, hash_file, to_hex};
pub use tools::{glob_match, is_os_hidden_file, should_hash};
pub use walk::{WalkOutcome, WalkSummary, run_walk_loop, spawn_walk_thread};
