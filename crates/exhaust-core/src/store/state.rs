// ── Activation state ──
//
// One `ExhaustState` per unit the controller is currently driving.
// Identity fields are fixed at creation; only the process bookkeeping
// moves afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::ModuleId;
use crate::unit::{Group, Tower, UnitId};

/// Whether the last requested hardware command has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Starting,
    Applied,
    Failed,
}

/// The hardware command the state is converging towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingCommand {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhaustState {
    /// Canonical unit key (`A1`).
    pub id: String,
    pub tower: Tower,
    #[serde(rename = "final")]
    pub final_digit: u8,
    pub group: Group,
    pub relay: u8,
    pub module_id: ModuleId,
    /// Absolute auto-off deadline; `None` means no auto-off.
    pub expires_at: Option<DateTime<Utc>>,
    pub process_status: ProcessStatus,
    pub pending_command: PendingCommand,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl ExhaustState {
    /// A fresh `starting` state for `unit`.
    pub fn new(unit: UnitId, pending: PendingCommand, now: DateTime<Utc>) -> Self {
        Self {
            id: unit.key(),
            tower: unit.tower,
            final_digit: unit.final_digit,
            group: unit.group(),
            relay: unit.relay(),
            module_id: unit.module(),
            expires_at: None,
            process_status: ProcessStatus::Starting,
            pending_command: pending,
            last_error: None,
            retry_count: 0,
            updated_at: now,
        }
    }

    pub fn unit(&self) -> UnitId {
        UnitId {
            tower: self.tower,
            final_digit: self.final_digit,
        }
    }

    /// Time left before auto-off; `None` without a deadline or once passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let left = self.expires_at? - now;
        (left > Duration::zero()).then_some(left)
    }

    /// Remaining time rounded up to whole minutes.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        let left = self.remaining(now)?;
        let ms = left.num_milliseconds();
        Some((ms + 59_999) / 60_000)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether this state describes a fan that should currently be running.
    pub fn is_active(&self) -> bool {
        self.pending_command == PendingCommand::On && self.process_status == ProcessStatus::Applied
    }

    pub fn mark_applied(&mut self, now: DateTime<Utc>) {
        self.process_status = ProcessStatus::Applied;
        self.last_error = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.process_status = ProcessStatus::Failed;
        self.last_error = Some(error.into());
        self.retry_count = self.retry_count.saturating_add(1);
        self.updated_at = now;
    }
}

/// An `ExhaustState` with its computed remaining minutes, for status views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    #[serde(flatten)]
    pub state: ExhaustState,
    pub remaining_minutes: Option<i64>,
}

impl MemoryEntry {
    pub fn new(state: ExhaustState, now: DateTime<Utc>) -> Self {
        let remaining_minutes = state.remaining_minutes(now);
        Self {
            state,
            remaining_minutes,
        }
    }
}
