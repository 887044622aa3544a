//! CLI-side configuration: `--config` resolution on top of `exhaust-config`.
//!
//! Core never sees these types -- it receives a pre-built `ExhaustConfig`.

use std::path::PathBuf;

use exhaust_config::Config;
use exhaust_core::ExhaustConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `EXHAUST_CONFIG`, else the platform path.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(exhaust_config::config_path)
}

/// Load file + environment.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_path(global);
    tracing::debug!(path = %path.display(), "loading configuration");
    Ok(exhaust_config::load_config(Some(&path))?)
}

/// Load and translate into the core's runtime configuration.
pub fn runtime(global: &GlobalOpts) -> Result<ExhaustConfig, CliError> {
    Ok(load(global)?.to_runtime()?)
}
