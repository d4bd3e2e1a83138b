// ── Device model ──
//
// Lights and covers as the bridge sees them: what they are (kind and
// bound gateway addresses) and what they last reported (state).

pub mod device;
pub mod level;

pub use device::{
    Binding, CoverMotion, CoverScenes, CoverState, Device, DeviceConfig, DeviceId, DeviceKind,
    DeviceState, LightKind, LightState, Role,
};
pub use level::Level;
