//! Runtime bridge between a home-automation host and a Scenario IFSEI
//! Classic gateway.
//!
//! - **[`Bridge`]**: central facade. [`start()`](Bridge::start) spawns the
//!   link supervisor and the command dispatcher; [`shutdown()`](Bridge::shutdown)
//!   stops them. Hands out [`LightHandle`] and [`CoverHandle`] entities.
//!
//! - **Link** ([`link`]): the connection state machine
//!   ([`StateMachine`]) and the supervisor that owns the socket, routes
//!   notifications from a per-session reader task, and reconnects with a
//!   fixed delay. The first failure is fatal only when reconnect is
//!   disabled; once the link has been up, every failure is recovered.
//!
//! - **[`CommandQueue`]**: unbounded FIFO drained onto the link at least
//!   `send_delay` apart, paused while disconnected. Failed dispatches go
//!   back to the front.
//!
//! - **[`DeviceRegistry`]**: configured lights and covers keyed by id and by
//!   gateway address, with synchronous per-device listeners behind RAII
//!   [`Subscription`] guards.
//!
//! - **[`NotificationRouter`]**: applies gateway notifications to the
//!   registry in arrival order.

pub mod bridge;
pub mod config;
mod dispatch;
pub mod entity;
pub mod error;
pub mod link;
pub mod model;
pub mod queue;
pub mod router;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use config::{BridgeConfig, BridgeOptions, ReconnectPolicy};
pub use entity::{CoverHandle, LightHandle};
pub use error::CoreError;
pub use link::{
    ConnectionState, FailureCause, LinkDiagnostics, LinkEvent, LinkMode, StateMachine,
};
pub use queue::{CommandQueue, QueuedCommand};
pub use router::{NotificationRouter, RouteOutcome};
pub use store::{DeviceEvent, DeviceRegistry, Subscription};

pub use model::{
    Binding, CoverMotion, CoverScenes, CoverState, Device, DeviceConfig, DeviceId, DeviceKind,
    DeviceState, Level, LightKind, LightState, Role,
};
