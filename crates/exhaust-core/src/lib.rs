//! State machine for a fleet of pulse-relay exhaust fans.
//!
//! This crate owns the business logic between `exhaust-api` (HTTP
//! command transport) and the `exhaust` CLI:
//!
//! - **[`Controller`]**: central facade. [`start()`](Controller::start)
//!   runs the first scheduler tick and spawns the periodic loop;
//!   [`Controller::oneshot()`](Controller::oneshot) probes the modules and
//!   runs a single operation without a scheduler.
//!
//! - **Activation**: [`turn_on`](Controller::turn_on) switches a unit's
//!   relay on; [`turn_off`](Controller::turn_off) cuts the tower+group
//!   branch on the PWR module and re-arms the neighbours that still have
//!   time left.
//!
//! - **Stores** ([`store`]): the persisted [`StateStore`] of unit
//!   activations and the in-memory [`ModuleStatusCache`].
//!
//! - **Identity** ([`unit`], [`registry`]): [`UnitId`] parsing and the
//!   derived group, relay and module, and the [`ModuleRegistry`] of hosts.

pub mod config;
pub mod controller;
pub mod error;
mod initializer;
mod orchestrator;
pub mod registry;
mod scheduler;
pub mod store;
pub mod unit;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{EXPECTED_PULSE_TIME, ExhaustConfig, RELAY_COUNT};
pub use controller::Controller;
pub use error::{CoreError, InitError, InitErrorCode};
pub use orchestrator::{
    FleetStatus, ProcessSnapshot, RestoreOutcome, TurnOffAck, TurnOnAck, UnitStatus,
};
pub use registry::{ModuleId, ModuleRegistry};
pub use scheduler::TickReport;
pub use store::{
    ExhaustState, MemoryEntry, ModuleStatus, ModuleStatusCache, PendingCommand, ProcessStatus,
    StateStore,
};
pub use unit::{Group, Tower, UnitId};
