//! Load `.pipeworks.toml` from the hashed directory (CLI only). The library takes its
//! settings through `StageOpts` and never reads this file.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct PipeworksToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    workers: Option<usize>,
    input_cap: Option<usize>,
    timeout: Option<u64>,
    exclude: Option<Vec<String>>,
    follow_links: Option<bool>,
    json: Option<bool>,
    sort: Option<bool>,
    verbose: Option<bool>,
}

/// Parse config text.
pub fn parse_pipeworks_toml(text: &str) -> Result<PipeworksToml, toml::de::Error> {
    toml::from_str(text)
}

/// Load the config file from `dir`. `Ok(None)` when there is no file; malformed files are
/// an error the caller reports once logging is up.
pub fn load_pipeworks_toml(dir: &Path) -> anyhow::Result<Option<PipeworksToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let parsed = parse_pipeworks_toml(&text).with_context(|| path.display().to_string())?;
    Ok(Some(parsed))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file values to `opts`. Call before layering CLI flags.
pub fn apply_file_to_opts(file: &PipeworksToml, opts: &mut Opts) {
    let s = &file.settings;
    if s.workers.is_some() {
        opts.workers = s.workers;
    }
    if s.timeout.is_some() {
        opts.timeout_secs = s.timeout;
    }
    apply_file_opt!(s, opts, input_cap => input_cap);
    apply_file_opt!(s, opts, exclude => exclude);
    apply_file_opt!(s, opts, follow_links => follow_links);
    apply_file_opt!(s, opts, json => json);
    apply_file_opt!(s, opts, sort => sort);
    apply_file_opt!(s, opts, verbose => verbose);
}
