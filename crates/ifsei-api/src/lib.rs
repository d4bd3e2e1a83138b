// ifsei-api: protocol boundary for Scenario IFSEI Classic gateways.

pub mod error;
pub mod message;
pub mod transport;

pub use error::Error;
pub use message::{
    Address, ChannelAddress, Command, MAX_LEVEL, Notification, Operation, ReportedState, SceneId,
};
pub use transport::{
    CommandSink, Connector, DEFAULT_PORT, Endpoint, NotificationSource, TcpCommandSink,
    TcpConnector, TcpNotificationSource, TransportConfig,
};
