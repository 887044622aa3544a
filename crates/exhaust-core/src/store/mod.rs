// ── State and status stores ──
//
// Explicitly owned stores handed to the controller: unit activation
// state (persisted) and per-module status (in memory).

mod state;
mod state_store;
mod status_cache;

pub use state::{ExhaustState, MemoryEntry, PendingCommand, ProcessStatus};
pub use state_store::{STATE_FILE_VERSION, StateStore};
pub use status_cache::{ModuleStatus, ModuleStatusCache};
