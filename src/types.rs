//! Public and internal types for the pipeworks API and the hashing CLI.

use serde::Serialize;
use std::path::PathBuf;

/// Construction options for one pipeline stage.
#[derive(Clone, Debug)]
pub struct StageOpts {
    /// Stage name, used for worker thread names, log lines and fault messages.
    pub name: String,
    /// Number of long-lived worker threads. Must be at least 1.
    pub workers: usize,
    /// Maximum number of queued input items; 0 for unbounded.
    pub input_capacity: usize,
}

impl Default for StageOpts {
    fn default() -> Self {
        Self {
            name: "stage".to_string(),
            workers: 1,
            input_capacity: 0,
        }
    }
}

impl StageOpts {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn input_capacity(mut self, input_capacity: usize) -> Self {
        self.input_capacity = input_capacity;
        self
    }
}

/// Which per-item routine a stage runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Sync,
    Async,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Sync => write!(f, "sync"),
            StageKind::Async => write!(f, "async"),
        }
    }
}

/// Outcome of hashing one file. Read failures are per-file results, not pipeline faults.
#[derive(Clone, Debug, Serialize)]
pub struct FileDigest {
    pub path: PathBuf,
    pub size: u64,
    /// Blake3 hex digest, `None` when the file could not be read.
    pub hash: Option<String>,
    /// Error message when hashing failed.
    pub error: Option<String>,
}

impl FileDigest {
    pub fn success(&self) -> bool {
        self.hash.is_some()
    }
}

/// Options for the hashing CLI: `.pipeworks.toml` values with CLI flags layered on top.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Hashing workers; `None` derives it from rayon and the FD limit.
    pub workers: Option<usize>,
    /// Bounded input queue for the hashing stage; 0 for unbounded.
    pub input_cap: usize,
    /// Cancel the run when it takes longer than this.
    pub timeout_secs: Option<u64>,
    /// Exclude patterns (glob syntax) applied during the walk.
    pub exclude: Vec<String>,
    pub follow_links: bool,
    /// Print JSON lines instead of `<hash>  <path>`.
    pub json: bool,
    /// Sort results by path before printing.
    pub sort: bool,
    pub verbose: bool,
}
