//! Pipeworks CLI: hash every file under a directory with a parallel worker pipeline.

use anyhow::Result;
use clap::Parser;
use pipeworks::engine::arg_parser::Cli;
use pipeworks::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
