// ── Gateway link ──
//
// Connection lifecycle: the pure state machine and the supervisor that
// drives it against a real `Connector`.

mod manager;
mod state;

pub(crate) use manager::{Control, Link, supervise};
pub use manager::LinkDiagnostics;
pub use state::{ConnectionState, FailureCause, LinkEvent, LinkMode, StateMachine};
