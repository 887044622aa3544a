// ── Module registry ──
//
// Static table of the fleet's eight relay modules and their hosts.
// Built once from configuration and never mutated afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::unit::{Group, Tower, normalize};

/// One of the eight modules, in fixed slot order.
///
/// `Ord` follows declaration order, which is also the 1-based index
/// order accepted by [`ModuleRegistry::resolve_flexible`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum ModuleId {
    #[strum(serialize = "A_14")]
    #[serde(rename = "A_14")]
    A14,
    #[strum(serialize = "A_58")]
    #[serde(rename = "A_58")]
    A58,
    #[strum(serialize = "B_14")]
    #[serde(rename = "B_14")]
    B14,
    #[strum(serialize = "B_58")]
    #[serde(rename = "B_58")]
    B58,
    #[strum(serialize = "C_14")]
    #[serde(rename = "C_14")]
    C14,
    #[strum(serialize = "C_58")]
    #[serde(rename = "C_58")]
    C58,
    #[strum(serialize = "PWR_14")]
    #[serde(rename = "PWR_14")]
    Pwr14,
    #[strum(serialize = "PWR_58")]
    #[serde(rename = "PWR_58")]
    Pwr58,
}

impl ModuleId {
    /// Fixed slot order (`A_14, A_58, B_14, B_58, C_14, C_58, PWR_14, PWR_58`).
    pub const ALL: [ModuleId; 8] = [
        ModuleId::A14,
        ModuleId::A58,
        ModuleId::B14,
        ModuleId::B58,
        ModuleId::C14,
        ModuleId::C58,
        ModuleId::Pwr14,
        ModuleId::Pwr58,
    ];

    /// The relay module of a tower/group (`{tower}_{group}`).
    pub fn relay_module(tower: Tower, group: Group) -> Self {
        match (tower, group) {
            (Tower::A, Group::G14) => Self::A14,
            (Tower::A, Group::G58) => Self::A58,
            (Tower::B, Group::G14) => Self::B14,
            (Tower::B, Group::G58) => Self::B58,
            (Tower::C, Group::G14) => Self::C14,
            (Tower::C, Group::G58) => Self::C58,
        }
    }

    /// The power-cut module of a group (`PWR_{group}`).
    pub fn power_cut(group: Group) -> Self {
        match group {
            Group::G14 => Self::Pwr14,
            Group::G58 => Self::Pwr58,
        }
    }

    pub fn is_power_cut(self) -> bool {
        matches!(self, Self::Pwr14 | Self::Pwr58)
    }

    /// 1-based slot index.
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Module → host table.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    hosts: BTreeMap<ModuleId, String>,
}

impl ModuleRegistry {
    /// Build from configured hosts; blank entries are treated as unconfigured.
    pub fn new(hosts: impl IntoIterator<Item = (ModuleId, String)>) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|(m, h)| (m, h.trim().to_owned()))
            .filter(|(_, h)| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn resolve_host(&self, module: ModuleId) -> Result<&str, CoreError> {
        self.hosts
            .get(&module)
            .map(String::as_str)
            .ok_or(CoreError::NotConfigured { module })
    }

    /// Resolve an operator-supplied key: IPv4 literal, module name (any
    /// case, `-` or `_`) or 1-based slot index.
    pub fn resolve_flexible(&self, key: &str) -> Result<String, CoreError> {
        let trimmed = key.trim();

        if is_dotted_quad(trimmed) {
            return Ok(trimmed.to_owned());
        }

        if let Ok(module) = normalize(trimmed).parse::<ModuleId>() {
            return self.resolve_host(module).map(str::to_owned);
        }

        if let Some(module) = trimmed.parse::<usize>().ok().and_then(ModuleId::from_index) {
            return self.resolve_host(module).map(str::to_owned);
        }

        Err(CoreError::InvalidModuleKey {
            key: key.to_owned(),
        })
    }

    /// Configured modules with their hosts, in slot order.
    pub fn configured(&self) -> impl Iterator<Item = (ModuleId, &str)> {
        self.hosts.iter().map(|(m, h)| (*m, h.as_str()))
    }

    pub fn is_configured(&self, module: ModuleId) -> bool {
        self.hosts.contains_key(&module)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Four dot-separated decimal octets, each 0-255. Leading zeros are
/// allowed (`010.0.0.1`); the literal is passed to the HTTP layer as is.
fn is_dotted_quad(s: &str) -> bool {
    let mut octets = 0;
    for part in s.split('.') {
        octets += 1;
        let valid = (1..=3).contains(&part.len())
            && part.bytes().all(|b| b.is_ascii_digit())
            && part.parse::<u16>().is_ok_and(|n| n <= 255);
        if !valid || octets > 4 {
            return false;
        }
    }
    octets == 4
}
