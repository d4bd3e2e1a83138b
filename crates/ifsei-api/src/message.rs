// ── Structured gateway messages ──
//
// The gateway speaks in two directions: commands we send (set a channel
// level, trigger a scene) and notifications it emits when something changes
// on the bus. Byte framing belongs to the codec handed to the transport;
// everything above the codec only sees these types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest level a dimmer channel accepts.
pub const MAX_LEVEL: u8 = 100;

// ── Address ──────────────────────────────────────────────────────────

/// A dimmer/relay output on the gateway bus: module number plus channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelAddress {
    pub module: u8,
    pub channel: u8,
}

impl ChannelAddress {
    pub const fn new(module: u8, channel: u8) -> Self {
        Self { module, channel }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{:02}C{:02}", self.module, self.channel)
    }
}

/// A scene stored on the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub u16);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:04}", self.0)
    }
}

/// Anything a command can target or a notification can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Address {
    Channel(ChannelAddress),
    Scene(SceneId),
}

impl From<ChannelAddress> for Address {
    fn from(value: ChannelAddress) -> Self {
        Self::Channel(value)
    }
}

impl From<SceneId> for Address {
    fn from(value: SceneId) -> Self {
        Self::Scene(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(c) => c.fmt(f),
            Self::Scene(s) => s.fmt(f),
        }
    }
}

// ── Command ──────────────────────────────────────────────────────────

/// What a command asks the gateway to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Drive a channel to a level in `0..=100`.
    SetLevel(u8),
    /// Fire a scene.
    Trigger,
}

/// An outgoing instruction to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    pub target: Address,
    pub operation: Operation,
}

impl Command {
    /// Set a channel level. Levels above [`MAX_LEVEL`] are clamped.
    pub fn set_level(target: ChannelAddress, level: u8) -> Self {
        Self {
            target: Address::Channel(target),
            operation: Operation::SetLevel(level.min(MAX_LEVEL)),
        }
    }

    /// Trigger a scene.
    pub fn trigger(scene: SceneId) -> Self {
        Self {
            target: Address::Scene(scene),
            operation: Operation::Trigger,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            Operation::SetLevel(level) => write!(f, "{} <- {level}", self.target),
            Operation::Trigger => write!(f, "{} <- trigger", self.target),
        }
    }
}

// ── Notification ─────────────────────────────────────────────────────

/// State reported by the gateway for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportedState {
    /// Current level of a channel, `0..=100`.
    Level(u8),
    SceneActive,
    SceneInactive,
}

/// An incoming state update from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub source: Address,
    pub state: ReportedState,
}

impl Notification {
    pub fn level(source: ChannelAddress, level: u8) -> Self {
        Self {
            source: Address::Channel(source),
            state: ReportedState::Level(level),
        }
    }

    pub fn scene(scene: SceneId, active: bool) -> Self {
        Self {
            source: Address::Scene(scene),
            state: if active {
                ReportedState::SceneActive
            } else {
                ReportedState::SceneInactive
            },
        }
    }
}
