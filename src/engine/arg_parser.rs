use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Hash every file under a directory through a parallel worker pipeline.
#[derive(Clone, Parser)]
#[command(name = "pipeworks")]
#[command(about = "Hash every file under DIR with a pool of blake3 workers.")]
pub struct Cli {
    /// Directory to hash. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Number of hashing workers. Default: available threads, capped by the open-file limit.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Bound on queued paths waiting for a worker (0 = unbounded).
    #[arg(long, short = 'q', value_parser = clap::value_parser!(usize))]
    pub input_cap: Option<usize>,

    /// Cancel after this many seconds and print whatever finished.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u64))]
    pub timeout: Option<u64>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2 pattern3
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Print one JSON object per file.
    #[arg(long, short = 'j', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Sort output by path (results otherwise arrive in completion order).
    #[arg(long, short = 's', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub sort: Option<bool>,

    /// Verbose output: debug logging and a progress counter.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
