// ── Output levels ──

use std::fmt;

use ifsei_api::MAX_LEVEL;
use serde::{Deserialize, Serialize};

/// A channel level in `0..=100`, as the gateway understands it.
///
/// Construction always clamps, so a `Level` is never out of range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const OFF: Self = Self(0);
    pub const FULL: Self = Self(MAX_LEVEL);

    pub fn new(value: u8) -> Self {
        Self(value.min(MAX_LEVEL))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_off(self) -> bool {
        self.0 == 0
    }

    /// Scale a host brightness (`0..=255`) down to a gateway level,
    /// rounding to nearest.
    pub fn from_host(value: u8) -> Self {
        let scaled = (u32::from(value) * u32::from(MAX_LEVEL) + 127) / 255;
        Self::new(u8::try_from(scaled).unwrap_or(MAX_LEVEL))
    }

    /// Scale back up to host brightness (`0..=255`), rounding down.
    pub fn to_host(self) -> u8 {
        let scaled = u32::from(self.0) * 255 / u32::from(MAX_LEVEL);
        u8::try_from(scaled).unwrap_or(u8::MAX)
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        value.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_to_max() {
        assert_eq!(Level::new(250), Level::FULL);
        assert_eq!(Level::new(42).get(), 42);
    }

    #[test]
    fn host_scaling_matches_gateway_conventions() {
        assert_eq!(Level::from_host(255), Level::FULL);
        assert_eq!(Level::from_host(0), Level::OFF);
        assert_eq!(Level::from_host(128).get(), 50);
        assert_eq!(Level::from_host(127).get(), 50);
        assert_eq!(Level::from_host(1).get(), 0);
        assert_eq!(Level::from_host(2).get(), 1);

        assert_eq!(Level::FULL.to_host(), 255);
        assert_eq!(Level::new(50).to_host(), 127);
        assert_eq!(Level::new(1).to_host(), 2);
    }

    #[test]
    fn conversion_from_raw_clamps() {
        assert_eq!(Level::from(180), Level::FULL);
        assert_eq!(u8::from(Level::new(30)), 30);
        assert_eq!(Level::new(30).to_string(), "30%");
    }
}
