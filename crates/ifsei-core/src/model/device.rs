// ── Device domain types ──

use std::fmt;

use ifsei_api::{Address, ChannelAddress, ReportedState, SceneId};
use serde::{Deserialize, Serialize};

use super::level::Level;

// ── DeviceId ────────────────────────────────────────────────────────

/// Stable identifier of a configured light or cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ── Kinds ───────────────────────────────────────────────────────────

/// Which outputs a light drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case", tag = "type")]
#[strum(serialize_all = "snake_case")]
pub enum LightKind {
    /// Relay output: any non-zero level is "on".
    OnOff { channel: ChannelAddress },
    Dimmable { channel: ChannelAddress },
    /// Four dimmer channels; `white` carries overall brightness.
    Rgb {
        red: ChannelAddress,
        green: ChannelAddress,
        blue: ChannelAddress,
        white: ChannelAddress,
    },
}

impl LightKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn supports_brightness(&self) -> bool {
        !matches!(self, Self::OnOff { .. })
    }

    pub fn supports_color(&self) -> bool {
        matches!(self, Self::Rgb { .. })
    }

    fn bindings(&self) -> Vec<(Address, Role)> {
        match *self {
            Self::OnOff { channel } | Self::Dimmable { channel } => {
                vec![(channel.into(), Role::Brightness)]
            }
            Self::Rgb {
                red,
                green,
                blue,
                white,
            } => vec![
                (red.into(), Role::Red),
                (green.into(), Role::Green),
                (blue.into(), Role::Blue),
                (white.into(), Role::Brightness),
            ],
        }
    }
}

/// Gateway scenes that move a cover, plus an optional channel that
/// reports its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverScenes {
    pub up: SceneId,
    pub down: SceneId,
    pub stop: SceneId,
    #[serde(default)]
    pub position: Option<ChannelAddress>,
}

impl CoverScenes {
    fn bindings(&self) -> Vec<(Address, Role)> {
        let mut out = vec![
            (self.up.into(), Role::SceneUp),
            (self.down.into(), Role::SceneDown),
            (self.stop.into(), Role::SceneStop),
        ];
        if let Some(position) = self.position {
            out.push((position.into(), Role::Position));
        }
        out
    }
}

/// Closed set of device kinds the bridge knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Light(LightKind),
    Cover(CoverScenes),
}

impl DeviceKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Every gateway address this kind listens on, with the part of the
    /// device state each one feeds.
    pub(crate) fn bindings(&self) -> Vec<(Address, Role)> {
        match self {
            Self::Light(light) => light.bindings(),
            Self::Cover(cover) => cover.bindings(),
        }
    }
}

/// What a notification on a bound address means for its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Brightness,
    Red,
    Green,
    Blue,
    SceneUp,
    SceneDown,
    SceneStop,
    Position,
}

/// One device's interest in one gateway address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub device: DeviceId,
    pub role: Role,
}

// ── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub brightness: Level,
    pub red: Level,
    pub green: Level,
    pub blue: Level,
}

impl LightState {
    /// Whether any output is lit. Availability is checked by the caller.
    pub fn is_lit(&self) -> bool {
        !(self.brightness.is_off()
            && self.red.is_off()
            && self.green.is_off()
            && self.blue.is_off())
    }

    pub fn rgb(&self) -> (Level, Level, Level) {
        (self.red, self.green, self.blue)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoverMotion {
    Opening,
    Closing,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverState {
    pub motion: CoverMotion,
    pub is_closed: bool,
    pub position: Option<Level>,
}

impl Default for CoverState {
    /// Covers are assumed closed until the gateway says otherwise.
    fn default() -> Self {
        Self {
            motion: CoverMotion::Stopped,
            is_closed: true,
            position: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DeviceState {
    Light(LightState),
    Cover(CoverState),
}

impl DeviceState {
    pub fn initial(kind: &DeviceKind) -> Self {
        match kind {
            DeviceKind::Light(_) => Self::Light(LightState::default()),
            DeviceKind::Cover(_) => Self::Cover(CoverState::default()),
        }
    }

    /// Fold one reported state into the device. Returns `true` if anything
    /// changed. Applying the same report twice is a no-op the second time.
    pub fn apply(&mut self, role: Role, reported: ReportedState) -> bool {
        let before = *self;
        match (&mut *self, role, reported) {
            (Self::Light(light), role, ReportedState::Level(value)) => {
                let level = Level::new(value);
                match role {
                    Role::Brightness => light.brightness = level,
                    Role::Red => light.red = level,
                    Role::Green => light.green = level,
                    Role::Blue => light.blue = level,
                    _ => {}
                }
            }
            (Self::Cover(cover), Role::SceneDown, ReportedState::SceneActive) => {
                cover.motion = CoverMotion::Closing;
                cover.is_closed = true;
            }
            (Self::Cover(cover), Role::SceneUp, ReportedState::SceneActive) => {
                cover.motion = CoverMotion::Opening;
                cover.is_closed = false;
            }
            (
                Self::Cover(cover),
                Role::SceneStop,
                ReportedState::SceneActive | ReportedState::SceneInactive,
            ) => {
                cover.motion = CoverMotion::Stopped;
            }
            (Self::Cover(cover), Role::Position, ReportedState::Level(value)) => {
                let level = Level::new(value);
                cover.position = Some(level);
                cover.is_closed = level.is_off();
            }
            _ => {}
        }
        *self != before
    }
}

// ── Device ──────────────────────────────────────────────────────────

/// Declaration of a device, as produced by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub kind: DeviceKind,
}

/// A light or cover and its last known state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub zone: Option<String>,
    pub kind: DeviceKind,
    pub state: DeviceState,
}

impl Device {
    pub fn from_config(config: DeviceConfig) -> Self {
        let state = DeviceState::initial(&config.kind);
        Self {
            id: config.id,
            name: config.name,
            zone: config.zone,
            kind: config.kind,
            state,
        }
    }

    pub fn light_state(&self) -> Option<&LightState> {
        match &self.state {
            DeviceState::Light(s) => Some(s),
            DeviceState::Cover(_) => None,
        }
    }

    pub fn cover_state(&self) -> Option<&CoverState> {
        match &self.state {
            DeviceState::Cover(s) => Some(s),
            DeviceState::Light(_) => None,
        }
    }
}
