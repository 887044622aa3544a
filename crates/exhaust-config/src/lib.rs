//! Configuration for the exhaust controller.
//!
//! TOML file + `EXHAUST_*` environment, layered with figment and
//! translated into `exhaust_core::ExhaustConfig`. The core never reads
//! configuration itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exhaust_api::TransportConfig;
use exhaust_core::{ExhaustConfig, ModuleId, unit::normalize};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// Top-level configuration file.
///
/// ```toml
/// port = 80
/// sweep_interval_ms = 60000
///
/// [hosts]
/// A_14 = "10.0.0.11"
/// PWR_14 = "10.0.0.17"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Host per module name. Blank values leave the module unconfigured.
    pub hosts: BTreeMap<String, String>,

    pub scheme: String,

    pub port: u16,

    pub command_path: String,

    /// Per-command timeout.
    pub timeout_ms: u64,

    /// Scheduler tick period.
    pub sweep_interval_ms: u64,

    /// Pause between consecutive relay-on commands.
    pub rearm_delay_ms: u64,

    /// Neighbours with this many minutes left or fewer are not re-armed.
    pub rearm_threshold_minutes: i64,

    /// State document; defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: BTreeMap::new(),
            scheme: "http".into(),
            port: exhaust_api::transport::DEFAULT_PORT,
            command_path: exhaust_api::transport::DEFAULT_COMMAND_PATH.into(),
            timeout_ms: 30_000,
            sweep_interval_ms: 60_000,
            rearm_delay_ms: 2_000,
            rearm_threshold_minutes: 5,
            state_file: None,
        }
    }
}

impl Config {
    /// Parse and validate the `hosts` table, in slot order. Spellings of
    /// the same module collapse to the last one in key order.
    pub fn module_hosts(&self) -> Result<Vec<(ModuleId, String)>, ConfigError> {
        let hosts: BTreeMap<ModuleId, String> = self
            .hosts
            .iter()
            .filter(|(_, host)| !host.trim().is_empty())
            .map(|(name, host)| {
                normalize(name)
                    .parse::<ModuleId>()
                    .map(|module| (module, host.trim().to_owned()))
                    .map_err(|_| ConfigError::Validation {
                        field: format!("hosts.{name}"),
                        reason: "expected one of A_14, A_58, B_14, B_58, C_14, C_58, PWR_14, PWR_58"
                            .into(),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(hosts.into_iter().collect())
    }

    /// State file in effect: configured, or the platform default.
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_path)
    }

    /// Build the core's runtime configuration.
    pub fn to_runtime(&self) -> Result<ExhaustConfig, ConfigError> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "scheme".into(),
                reason: format!("expected 'http' or 'https', got '{}'", self.scheme),
            });
        }
        for (field, value) in [
            ("timeout_ms", self.timeout_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }

        Ok(ExhaustConfig {
            hosts: self.module_hosts()?,
            transport: TransportConfig {
                scheme: self.scheme.clone(),
                port: self.port,
                command_path: self.command_path.trim_matches('/').to_owned(),
                timeout: Duration::from_millis(self.timeout_ms),
            },
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            rearm_delay: Duration::from_millis(self.rearm_delay_ms),
            rearm_threshold_minutes: self.rearm_threshold_minutes,
            state_path: Some(self.state_path()),
        })
    }

    /// Render as TOML (for `config show`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "exhaust")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the persisted state document.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.json"),
        |dirs| dirs.data_local_dir().join("state.json"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("exhaust");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// `EXHAUST_*` variables. `EXHAUST_{MODULE}_HOST` lands in the `hosts`
/// table; everything else maps onto the top-level key of the same name.
fn env_provider() -> Env {
    Env::prefixed("EXHAUST_").map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        if let Some(module) = key.strip_suffix("_host").filter(|m| !m.is_empty()) {
            return format!("hosts.{module}").into();
        }
        key.into()
    })
}

/// The layered figment: defaults, then the TOML file, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
}

/// Load the configuration from `path` (or the platform default) plus
/// environment. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}
