//! CLI handler: walk DIR, hash through a worker pipeline, print digests.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::engine::hashing::digest_path;
use crate::engine::progress::{BatchedProgress, create_counter};
use crate::engine::walk::spawn_walk_thread;
use crate::utils::{
    PackagePaths, ProgressConsts, WorkerThreadLimits, apply_file_to_opts, load_pipeworks_toml,
    max_workers_by_fd_limit, setup_logging,
};
use crate::{DrainHandle, FileDigest, Opts, Pipeline, StageOpts};

/// Overwrite opts with the flags given on the command line.
pub fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    if cli.workers.is_some() {
        opts.workers = cli.workers;
    }
    if let Some(cap) = cli.input_cap {
        opts.input_cap = cap;
    }
    if cli.timeout.is_some() {
        opts.timeout_secs = cli.timeout;
    }
    if !cli.exclude.is_empty() {
        opts.exclude = cli.exclude.clone();
    }
    if let Some(v) = cli.follow_links {
        opts.follow_links = v;
    }
    if let Some(v) = cli.json {
        opts.json = v;
    }
    if let Some(v) = cli.sort {
        opts.sort = v;
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
}

/// Config file first, then CLI. A malformed config file is returned for reporting.
fn setup_opts(cli: &Cli) -> (Opts, Option<anyhow::Error>) {
    let mut opts = Opts::default();
    let file_err = match load_pipeworks_toml(&cli.dir) {
        Ok(Some(file)) => {
            apply_file_to_opts(&file, &mut opts);
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };
    apply_cli_to_opts(cli, &mut opts);
    (opts, file_err)
}

/// Requested worker count, or available threads; capped by the open-file budget.
pub fn resolve_workers(requested: Option<usize>) -> usize {
    let limits = WorkerThreadLimits::current();
    let n = requested.unwrap_or(limits.all_threads);
    let n = match max_workers_by_fd_limit() {
        Some(cap) if cap < n => {
            debug!("capping hashing workers at {} (open-file limit)", cap);
            cap
        }
        _ => n,
    };
    limits.clamp(n)
}

/// `<hash>  <path>`, or `<error>  <path>` for files that could not be read.
pub fn format_digest(d: &FileDigest) -> String {
    match &d.hash {
        Some(hash) => format!("{}  {}", hash, d.path.display()),
        None => format!("<error>  {}", d.path.display()),
    }
}

/// Collects drain output: prints as results arrive, or buffers them when sorting.
struct Report {
    json: bool,
    sort: bool,
    buffered: Vec<FileDigest>,
    hashed: usize,
    failed: usize,
    progress: BatchedProgress,
}

impl Report {
    fn record(&mut self, d: FileDigest) {
        self.progress.tick();
        if d.success() {
            self.hashed += 1;
        } else {
            self.failed += 1;
            if let Some(err) = &d.error {
                debug!("{}: {}", d.path.display(), err);
            }
        }
        if self.sort {
            self.buffered.push(d);
        } else {
            self.print(&d);
        }
    }

    fn print(&self, d: &FileDigest) {
        if self.json {
            match serde_json::to_string(d) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("{}: {}", d.path.display(), e),
            }
        } else {
            println!("{}", format_digest(d));
        }
    }

    fn finish(&mut self) {
        self.progress.flush();
        if self.sort {
            let mut buffered = std::mem::take(&mut self.buffered);
            buffered.sort_by(|a, b| a.path.cmp(&b.path));
            for d in &buffered {
                self.print(d);
            }
        }
    }
}

/// Wait for the drain, cancelling the stage if it outlives `timeout_secs`.
/// Returns true when the run was cut short by the timeout.
fn wait_for_drain(
    drain: DrainHandle<()>,
    stage: &Pipeline<PathBuf, FileDigest>,
    timeout_secs: Option<u64>,
) -> crate::Result<bool> {
    let Some(secs) = timeout_secs else {
        return drain.wait().map(|()| false);
    };
    match drain.wait_timeout(Duration::from_secs(secs)) {
        Ok(res) => res.map(|()| false),
        Err(drain) => {
            warn!("timed out after {}s, cancelling", secs);
            stage.cancel_processing();
            drain.wait().map(|()| true)
        }
    }
}

/// Hash every file under `cli.dir`.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, file_err) = setup_opts(cli);
    setup_logging(opts.verbose);
    if let Some(e) = file_err {
        warn!("ignoring config file: {:#}", e);
    }
    debug!(
        "{} CONFIG:{:#?}",
        PackagePaths::get().pkg_name().to_uppercase(),
        opts
    );

    let root = cli
        .dir
        .canonicalize()
        .with_context(|| format!("canonicalize {}", cli.dir.display()))?;
    let workers = resolve_workers(opts.workers);
    let stage = Pipeline::new(
        digest_path,
        StageOpts::named("hash")
            .workers(workers)
            .input_capacity(opts.input_cap),
    )?;

    let on_interrupt = stage.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("interrupted, cancelling");
        on_interrupt.cancel_processing();
    }) {
        warn!("could not install Ctrl-C handler: {}", e);
    }

    let report = Arc::new(Mutex::new(Report {
        json: opts.json,
        sort: opts.sort,
        buffered: Vec::new(),
        hashed: 0,
        failed: 0,
        progress: BatchedProgress::new(
            opts.verbose.then(|| create_counter("Hashing")),
            ProgressConsts::PROGRESS_UPDATE_BATCH_SIZE,
        ),
    }));
    let sink = Arc::clone(&report);
    let drain = stage.consume_output(move |d| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(d)
    })?;

    let mut exclude = PackagePaths::get().default_exclude_patterns();
    exclude.extend(opts.exclude.iter().cloned());
    let walk = spawn_walk_thread(stage.clone(), &root, opts.follow_links, exclude);

    let timed_out = wait_for_drain(drain, &stage, opts.timeout_secs)?;
    let walked = walk
        .join()
        .map_err(|_| anyhow::anyhow!("walk thread panicked"))?;

    let mut report = report.lock().unwrap_or_else(PoisonError::into_inner);
    report.finish();

    if !walked.skipped.is_empty() {
        warn!(
            "Skipped {} paths due to permission errors or access issues",
            walked.skipped.len()
        );
        for (path, msg) in &walked.skipped {
            debug!("  skipped: {} ({})", path.display(), msg);
        }
    }
    if timed_out || stage.is_cancelled() {
        warn!(
            "run cancelled: {} of {} queued file(s) hashed",
            report.hashed + report.failed,
            walked.sent
        );
    }
    info!(
        "{} file(s) hashed, {} failed, {} worker(s)",
        report.hashed, report.failed, workers
    );
    Ok(())
}
