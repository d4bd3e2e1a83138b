// ── Device store ──
//
// Device state keyed by id and gateway address, with push-based change
// notification to registered listeners.

mod registry;
mod subscription;

pub use registry::DeviceRegistry;
pub use subscription::{DeviceEvent, Listener, Subscription};
