// ── Runtime fleet configuration ──
//
// These types describe *how* to reach the modules and how the scheduler
// paces itself. They never touch disk: the CLI (via exhaust-config)
// constructs an `ExhaustConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use exhaust_api::TransportConfig;

use crate::registry::{ModuleId, ModuleRegistry};

/// Pulse duration every relay must be configured with (device units).
pub const EXPECTED_PULSE_TIME: u64 = 5;

/// Relays per module.
pub const RELAY_COUNT: u8 = 4;

/// Configuration for one controller process.
#[derive(Debug, Clone)]
pub struct ExhaustConfig {
    /// Host per module; unconfigured modules are absent.
    pub hosts: Vec<(ModuleId, String)>,
    /// Scheme, port, path and timeout shared by every module.
    pub transport: TransportConfig,
    /// Scheduler tick period.
    pub sweep_interval: Duration,
    /// Pause between successive relay-on commands in one restore sequence.
    pub rearm_delay: Duration,
    /// Units with this many minutes left or fewer are not re-armed after
    /// a power cut.
    pub rearm_threshold_minutes: i64,
    /// Persisted state document. `None` keeps state in memory only.
    pub state_path: Option<PathBuf>,
}

impl Default for ExhaustConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            transport: TransportConfig::default(),
            sweep_interval: Duration::from_secs(60),
            rearm_delay: Duration::from_secs(2),
            rearm_threshold_minutes: 5,
            state_path: None,
        }
    }
}

impl ExhaustConfig {
    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::new(self.hosts.iter().cloned())
    }
}
