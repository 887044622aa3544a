// ── Unit identity ──
//
// An exhaust unit is addressed by tower letter and the apartment's final
// digit. Everything else (group, relay, module) is derived from those two.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::registry::ModuleId;

// ── Tower ───────────────────────────────────────────────────────────

/// Building section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tower {
    A,
    B,
    C,
}

impl Tower {
    pub const ALL: [Tower; 3] = [Tower::A, Tower::B, Tower::C];

    /// Relay of the group's PWR module that cuts this tower's branch.
    pub fn power_cut_relay(self) -> u8 {
        match self {
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            _ => None,
        }
    }
}

impl fmt::Display for Tower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(s)
    }
}

// ── Group ───────────────────────────────────────────────────────────

/// Final-digit group: finals 1-4 or 5-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    #[serde(rename = "14")]
    G14,
    #[serde(rename = "58")]
    G58,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::G14 => "14",
            Self::G58 => "58",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── UnitId ──────────────────────────────────────────────────────────

/// Parsed exhaust unit identifier.
///
/// Invariant: finals 1-4 map to group 14 with `relay == final`; finals
/// 5-8 map to group 58 with `relay == final - 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    pub tower: Tower,
    pub final_digit: u8,
}

impl UnitId {
    /// Parse any accepted spelling (`A1`, `a-1`, ` A_1 `).
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let normalized = normalize(raw);
        let invalid = || CoreError::InvalidUnitId {
            input: raw.to_owned(),
        };

        let mut chars = normalized.chars();
        let tower = chars.next().and_then(Tower::from_char).ok_or_else(invalid)?;
        let rest = chars.as_str();
        let digits = rest.strip_prefix('_').unwrap_or(rest);

        let mut digit_chars = digits.chars();
        let (Some(d), None) = (digit_chars.next(), digit_chars.next()) else {
            return Err(invalid());
        };
        let final_digit = d
            .to_digit(10)
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| (1..=8).contains(v))
            .ok_or_else(invalid)?;

        Ok(Self { tower, final_digit })
    }

    pub fn new(tower: Tower, final_digit: u8) -> Result<Self, CoreError> {
        if (1..=8).contains(&final_digit) {
            Ok(Self { tower, final_digit })
        } else {
            Err(CoreError::InvalidUnitId {
                input: format!("{tower}{final_digit}"),
            })
        }
    }

    pub fn group(self) -> Group {
        if self.final_digit <= 4 {
            Group::G14
        } else {
            Group::G58
        }
    }

    /// Relay index (1-4) within the unit's relay module.
    pub fn relay(self) -> u8 {
        if self.final_digit <= 4 {
            self.final_digit
        } else {
            self.final_digit - 4
        }
    }

    /// The relay module that drives this unit (`{tower}_{group}`).
    pub fn module(self) -> ModuleId {
        ModuleId::relay_module(self.tower, self.group())
    }

    /// The power-cut module shared by this unit's group.
    pub fn power_cut_module(self) -> ModuleId {
        ModuleId::power_cut(self.group())
    }

    /// Canonical state-store key (`A1`).
    pub fn key(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tower, self.final_digit)
    }
}

impl FromStr for UnitId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Trim, upper-case, drop whitespace and turn `-` into `_`.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}
