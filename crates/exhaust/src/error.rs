//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use exhaust_config::ConfigError;
use exhaust_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const OFFLINE: i32 = 4;
    pub const DEVICE: i32 = 5;
    pub const PERSISTENCE: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid exhaust id '{input}'")]
    #[diagnostic(
        code(exhaust::invalid_id),
        help("Use a tower letter A, B or C followed by a final digit 1-8: A1, a-1 or A_1.")
    )]
    InvalidUnitId { input: String },

    #[error("Invalid module '{key}'")]
    #[diagnostic(
        code(exhaust::invalid_module),
        help(
            "Use a module name (A_14 ... PWR_58), its slot index 1-8, or an IPv4 address.\n\
             Run: exhaust status to see configured modules"
        )
    )]
    InvalidModule { key: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No host configured for module {module}")]
    #[diagnostic(
        code(exhaust::not_configured),
        help(
            "Add it under [hosts] in the config file, or set EXHAUST_{env}_HOST.\n\
             Run: exhaust config path"
        )
    )]
    NotConfigured { module: String, env: String },

    #[error(transparent)]
    #[diagnostic(code(exhaust::config))]
    Config(#[from] ConfigError),

    // ── Fleet ────────────────────────────────────────────────────────
    #[error("Module {module} is offline")]
    #[diagnostic(
        code(exhaust::module_offline),
        help(
            "Last probe: {reason}\n\
             The scheduler re-initializes offline modules every tick; check power and network."
        )
    )]
    ModuleOffline { module: String, reason: String },

    #[error("Device command failed: {message}")]
    #[diagnostic(code(exhaust::device))]
    Device { message: String },

    #[error("{operation} of {id} was not applied: {message}")]
    #[diagnostic(
        code(exhaust::not_applied),
        help("The failure is recorded; `exhaust run` retries it on its next tick.")
    )]
    NotApplied {
        operation: String,
        id: String,
        message: String,
    },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Failed to persist state to {path}")]
    #[diagnostic(code(exhaust::persistence), help("{message}"))]
    Persistence { path: String, message: String },

    #[error("State file {path} is in use by another writer")]
    #[diagnostic(
        code(exhaust::state_locked),
        help(
            "A running `exhaust run` owns the state file. Stop it, or let the daemon \
             handle on/off; `exhaust status` and `exhaust process` still work read-only."
        )
    )]
    StateLocked { path: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(exhaust::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(exhaust::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidUnitId { .. } | Self::InvalidModule { .. } => exit_code::USAGE,
            Self::NotConfigured { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::ModuleOffline { .. } => exit_code::OFFLINE,
            Self::Device { .. } | Self::NotApplied { .. } => exit_code::DEVICE,
            Self::Persistence { .. } | Self::StateLocked { .. } => exit_code::PERSISTENCE,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidUnitId { input } => CliError::InvalidUnitId { input },

            CoreError::InvalidModuleKey { key } => CliError::InvalidModule { key },

            CoreError::NotConfigured { module } => CliError::NotConfigured {
                env: module.to_string(),
                module: module.to_string(),
            },

            CoreError::ModuleOffline { module, reason } => CliError::ModuleOffline {
                module: module.to_string(),
                reason,
            },

            CoreError::Transport { message, .. } => CliError::Device { message },

            CoreError::Persistence { path, message } => CliError::Persistence {
                path: path.display().to_string(),
                message,
            },

            CoreError::StateLocked { path } => CliError::StateLocked {
                path: path.display().to_string(),
            },
        }
    }
}
