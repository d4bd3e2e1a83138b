// ── Entity handles ──
//
// Host-facing light and cover objects. They translate host intents into
// queued gateway commands and read state back from the registry. Lights
// are updated optimistically; covers only move when the gateway reports
// their scenes.

use ifsei_api::{ChannelAddress, Command, Connector};
use tracing::debug;

use crate::bridge::Bridge;
use crate::model::{
    CoverMotion, CoverScenes, CoverState, DeviceId, DeviceState, Level, LightKind, LightState,
};

// ── Light ────────────────────────────────────────────────────────────

/// Control surface for one configured light.
pub struct LightHandle<C: Connector> {
    bridge: Bridge<C>,
    id: DeviceId,
    kind: LightKind,
}

impl<C: Connector> LightHandle<C> {
    pub(crate) fn new(bridge: Bridge<C>, id: DeviceId, kind: LightKind) -> Self {
        Self { bridge, id, kind }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    /// Turn the light on.
    ///
    /// `brightness` and `rgb` use the host scale (`0..=255`). Brightness
    /// defaults to full. On RGB lights a missing colour means all colour
    /// channels off, and the four channels are sent red, green, blue,
    /// white.
    pub fn turn_on(&self, brightness: Option<u8>, rgb: Option<(u8, u8, u8)>) {
        let brightness = Level::from_host(brightness.unwrap_or(u8::MAX));
        let (red, green, blue) = rgb.map_or((Level::OFF, Level::OFF, Level::OFF), |(r, g, b)| {
            (Level::from_host(r), Level::from_host(g), Level::from_host(b))
        });
        self.drive(LightState {
            brightness,
            red,
            green,
            blue,
        });
    }

    /// Drive every channel of the light to zero.
    pub fn turn_off(&self) {
        self.drive(LightState::default());
    }

    fn drive(&self, target: LightState) {
        let target = match self.kind {
            LightKind::OnOff { channel } => {
                let on = !target.brightness.is_off();
                let brightness = if on { Level::FULL } else { Level::OFF };
                self.send(channel, brightness);
                LightState {
                    brightness,
                    ..LightState::default()
                }
            }
            LightKind::Dimmable { channel } => {
                self.send(channel, target.brightness);
                LightState {
                    brightness: target.brightness,
                    ..LightState::default()
                }
            }
            LightKind::Rgb {
                red,
                green,
                blue,
                white,
            } => {
                self.send(red, target.red);
                self.send(green, target.green);
                self.send(blue, target.blue);
                self.send(white, target.brightness);
                target
            }
        };

        let result = self.bridge.update_device(&self.id, |state| match state {
            DeviceState::Light(light) if *light != target => {
                *light = target;
                true
            }
            _ => false,
        });
        if let Err(e) = result {
            debug!(device = %self.id, error = %e, "optimistic light update skipped");
        }
    }

    fn send(&self, channel: ChannelAddress, level: Level) {
        self.bridge.submit(Command::set_level(channel, level.get()));
    }

    pub fn state(&self) -> LightState {
        self.bridge
            .device(&self.id)
            .and_then(|d| d.light_state().copied())
            .unwrap_or_default()
    }

    /// On iff the gateway is reachable and any channel is lit.
    pub fn is_on(&self) -> bool {
        self.is_available() && self.state().is_lit()
    }

    /// Brightness on the host scale (`0..=255`).
    pub fn brightness(&self) -> u8 {
        self.state().brightness.to_host()
    }

    /// Colour on the host scale, for RGB lights.
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        if !self.kind.supports_color() {
            return None;
        }
        let (r, g, b) = self.state().rgb();
        Some((r.to_host(), g.to_host(), b.to_host()))
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available()
    }
}

// ── Cover ────────────────────────────────────────────────────────────

/// Control surface for one configured cover (shade).
pub struct CoverHandle<C: Connector> {
    bridge: Bridge<C>,
    id: DeviceId,
    scenes: CoverScenes,
}

impl<C: Connector> CoverHandle<C> {
    pub(crate) fn new(bridge: Bridge<C>, id: DeviceId, scenes: CoverScenes) -> Self {
        Self { bridge, id, scenes }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn scenes(&self) -> CoverScenes {
        self.scenes
    }

    pub fn open(&self) {
        self.bridge.submit(Command::trigger(self.scenes.up));
    }

    pub fn close(&self) {
        self.bridge.submit(Command::trigger(self.scenes.down));
    }

    pub fn stop(&self) {
        self.bridge.submit(Command::trigger(self.scenes.stop));
    }

    pub fn state(&self) -> CoverState {
        self.bridge
            .device(&self.id)
            .and_then(|d| d.cover_state().copied())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed
    }

    pub fn is_opening(&self) -> bool {
        self.state().motion == CoverMotion::Opening
    }

    pub fn is_closing(&self) -> bool {
        self.state().motion == CoverMotion::Closing
    }

    /// Position in `0..=100` when the cover has a position channel.
    pub fn position(&self) -> Option<u8> {
        self.state().position.map(Level::get)
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available()
    }
}
