pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod pipeworks_toml;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, max_open_fds, max_workers_by_fd_limit};
pub use logger::setup_logging;
pub use pipeworks_toml::{
    PipeworksToml, apply_file_to_opts, load_pipeworks_toml, parse_pipeworks_toml,
};
