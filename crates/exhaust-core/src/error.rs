// ── Core error types ──
//
// Domain errors from exhaust-core. Callers never see reqwest or
// serde errors directly -- the `From<exhaust_api::Error>` impl folds
// transport failures into a single retryable variant.

use std::path::PathBuf;

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::registry::ModuleId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Caller errors ────────────────────────────────────────────────
    #[error("Invalid exhaust id '{input}': use A1, A-1 or A_1 (tower A/B/C, final 1-8)")]
    InvalidUnitId { input: String },

    #[error("Invalid module '{key}': use a module name, a 1-8 index or an IPv4 address")]
    InvalidModuleKey { key: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("No host configured for module {module}")]
    NotConfigured { module: ModuleId },

    // ── Fleet errors ─────────────────────────────────────────────────
    #[error("Module {module} is offline: {reason}")]
    ModuleOffline { module: ModuleId, reason: String },

    #[error("Device command failed: {message}")]
    Transport {
        message: String,
        /// Timeouts, refused connections and 5xx/429 answers.
        transient: bool,
    },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Failed to persist state to {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("State file {} is locked by another writer", path.display())]
    StateLocked { path: PathBuf },
}

impl CoreError {
    /// Returns `true` for failures that a later retry may resolve.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { transient, .. } => *transient,
            Self::ModuleOffline { .. } => true,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<exhaust_api::Error> for CoreError {
    fn from(err: exhaust_api::Error) -> Self {
        CoreError::Transport {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

// ── Module initialization ────────────────────────────────────────────

/// Which bring-up step failed. Rendered in the status cache as
/// `STATUS_READ_FAILED`, `POWER_OFF_FAILED`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitErrorCode {
    StatusReadFailed,
    PowerOffFailed,
    #[strum(serialize = "PULSETIME_READ_FAILED")]
    #[serde(rename = "PULSETIME_READ_FAILED")]
    PulseTimeReadFailed,
    #[strum(serialize = "PULSETIME_CONFIG_FAILED")]
    #[serde(rename = "PULSETIME_CONFIG_FAILED")]
    PulseTimeConfigFailed,
    #[strum(serialize = "PULSETIME_VERIFY_FAILED")]
    #[serde(rename = "PULSETIME_VERIFY_FAILED")]
    PulseTimeVerifyFailed,
}

/// A failed module bring-up step, with the module and the cause.
#[derive(Debug, Error)]
#[error("{code} on module {module}: {message}")]
pub struct InitError {
    pub module: ModuleId,
    pub code: InitErrorCode,
    pub message: String,
}

impl InitError {
    pub fn new(module: ModuleId, code: InitErrorCode, message: impl Into<String>) -> Self {
        Self {
            module,
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_codes_render_screaming_snake() {
        assert_eq!(InitErrorCode::StatusReadFailed.to_string(), "STATUS_READ_FAILED");
        assert_eq!(InitErrorCode::PowerOffFailed.to_string(), "POWER_OFF_FAILED");
        assert_eq!(
            InitErrorCode::PulseTimeVerifyFailed.to_string(),
            "PULSETIME_VERIFY_FAILED"
        );
        let code: &'static str = InitErrorCode::PulseTimeReadFailed.into();
        assert_eq!(code, "PULSETIME_READ_FAILED");
    }

    #[test]
    fn init_codes_serialize_like_display() {
        let json = serde_json::to_string(&InitErrorCode::PulseTimeConfigFailed).unwrap_or_default();
        assert_eq!(json, "\"PULSETIME_CONFIG_FAILED\"");
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = CoreError::from(exhaust_api::Error::Timeout { timeout_secs: 30 });
        assert!(err.is_retryable());
        assert!(matches!(err, CoreError::Transport { transient: true, .. }));
    }

    #[test]
    fn client_side_status_is_not_retryable() {
        let err = CoreError::from(exhaust_api::Error::Status {
            status: 404,
            body: "not found".into(),
        });
        assert!(!err.is_retryable());

        let err = CoreError::from(exhaust_api::Error::Status {
            status: 503,
            body: "busy".into(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        let err = CoreError::InvalidUnitId { input: "Z9".into() };
        assert!(!err.is_retryable());
    }
}
