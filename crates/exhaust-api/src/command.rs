// ── Device command vocabulary ──
//
// The subset of the module's console commands this service issues,
// plus helpers for the few response fields it consults.

use std::fmt;

use serde_json::Value;

/// Relay output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("On"),
            Self::Off => f.write_str("Off"),
        }
    }
}

/// A single console command, rendered to the `cmnd` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// `Status`
    Status,
    /// `Power{relay} On|Off`
    Power { relay: u8, state: PowerState },
    /// `PulseTime` (read every relay's pulse setting)
    PulseTime,
    /// `PulseTime{relay} {value}`
    SetPulseTime { relay: u8, value: u64 },
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => f.write_str("Status"),
            Self::Power { relay, state } => write!(f, "Power{relay} {state}"),
            Self::PulseTime => f.write_str("PulseTime"),
            Self::SetPulseTime { relay, value } => write!(f, "PulseTime{relay} {value}"),
        }
    }
}

/// Extract `PulseTime.Set[]` from a `PulseTime` response.
///
/// Missing or malformed entries come back as `None` so callers can
/// compare index by index without caring about the response shape.
pub fn pulse_time_values(response: &Value) -> Vec<Option<u64>> {
    response
        .get("PulseTime")
        .and_then(|p| p.get("Set"))
        .and_then(Value::as_array)
        .map(|set| set.iter().map(Value::as_u64).collect())
        .unwrap_or_default()
}
