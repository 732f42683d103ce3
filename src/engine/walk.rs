//! Directory walk feeding the hashing stage.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::engine::tools::should_hash;
use crate::{Pipeline, PipelineError};

/// One result from a directory walk: a file to hash or an error with optional path.
pub enum WalkOutcome {
    File(PathBuf),
    Skip,
    Err { msg: String, path: Option<PathBuf> },
}

/// Convert a walkdir result into [`WalkOutcome`]; directories and other non-files are skipped.
pub fn to_outcome(r: Result<walkdir::DirEntry, walkdir::Error>) -> WalkOutcome {
    match r {
        Ok(entry) if entry.file_type().is_file() => WalkOutcome::File(entry.into_path()),
        Ok(_) => WalkOutcome::Skip,
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// What the walk did: files handed to the stage, and paths it could not read.
#[derive(Debug, Default)]
pub struct WalkSummary {
    pub sent: usize,
    pub skipped: Vec<(PathBuf, String)>,
    /// Set when the stage stopped accepting (cancelled) before the walk finished.
    pub interrupted: bool,
}

/// Feed every included file from `iter` into `stage`, then complete its input.
/// Stops early if the stage refuses items (cancelled).
pub fn run_walk_loop<I, U>(stage: &Pipeline<PathBuf, U>, iter: I, exclude: &[String]) -> WalkSummary
where
    I: Iterator<Item = WalkOutcome>,
    U: Send + 'static,
{
    let mut summary = WalkSummary::default();
    for outcome in iter {
        match outcome {
            WalkOutcome::File(path) => {
                if !should_hash(&path, exclude) {
                    continue;
                }
                match stage.add(path) {
                    Ok(()) => summary.sent += 1,
                    Err(PipelineError::Cancelled) | Err(PipelineError::ChannelClosed) => {
                        summary.interrupted = true;
                        break;
                    }
                    Err(e) => {
                        log::warn!("walk: {}", e);
                        summary.interrupted = true;
                        break;
                    }
                }
            }
            WalkOutcome::Skip => {}
            WalkOutcome::Err { msg, path } => {
                let path = path.unwrap_or_else(|| PathBuf::from("<no-path>"));
                summary.skipped.push((path, msg));
            }
        }
    }
    stage.complete_adding();
    log::debug!(
        "walk done: {} file(s) sent, {} skipped{}",
        summary.sent,
        summary.skipped.len(),
        if summary.interrupted { ", interrupted" } else { "" }
    );
    summary
}

/// Walk `root` on its own thread so a bounded stage input can apply backpressure
/// without stalling the output drain.
pub fn spawn_walk_thread<U>(
    stage: Pipeline<PathBuf, U>,
    root: &Path,
    follow_links: bool,
    exclude: Vec<String>,
) -> JoinHandle<WalkSummary>
where
    U: Send + 'static,
{
    let root = root.to_path_buf();
    thread::spawn(move || {
        let iter = walkdir::WalkDir::new(&root)
            .follow_links(follow_links)
            .into_iter()
            .map(to_outcome);
        run_walk_loop(&stage, iter, &exclude)
    })
}
