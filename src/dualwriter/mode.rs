//! Migration modes.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Stage of a live storage migration, from legacy-only to new-only.
///
/// Modes are ordered: a higher mode is further along the migration. Configuration
/// spells them as integers (`mode = 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Mode {
    /// Legacy store only.
    Mode0,
    /// Reads from legacy; writes to legacy, then to new on a best-effort basis.
    ///
    /// The new-store write is still awaited before the call returns, so its latency and
    /// the request deadline apply. Only its store error is ignored.
    Mode1,
    /// Reads from legacy; writes to both, both must succeed.
    Mode2,
    /// Reads from new; writes to both, both must succeed.
    Mode3,
    /// New store only.
    Mode4,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown migration mode: {0} (expected 0-4)")]
pub struct UnknownMode(pub String);

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Mode0, Mode::Mode1, Mode::Mode2, Mode::Mode3, Mode::Mode4];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The following stage, if any.
    pub fn next(self) -> Option<Mode> {
        Mode::try_from(self.as_u8() + 1).ok()
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mode{}", self.as_u8())
    }
}

impl TryFrom<u8> for Mode {
    type Error = UnknownMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Mode0),
            1 => Ok(Mode::Mode1),
            2 => Ok(Mode::Mode2),
            3 => Ok(Mode::Mode3),
            4 => Ok(Mode::Mode4),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode.as_u8()
    }
}

/// Accepts `3`, `mode3` and `Mode3`.
impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("mode")
            .or_else(|| trimmed.strip_prefix("Mode"))
            .unwrap_or(trimmed);
        digits
            .parse::<u8>()
            .map_err(|_| UnknownMode(s.to_string()))
            .and_then(|n| Mode::try_from(n).map_err(|_| UnknownMode(s.to_string())))
    }
}
