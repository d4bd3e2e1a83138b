// ── Gateway transport ──
//
// The only boundary between the bridge and the physical gateway. A
// `Connector` opens a session and hands back its two halves: a sink for
// commands and a source of notifications. They are split so the dispatcher
// and the reader can drive them from separate tasks.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::error::Error;
use crate::message::{Command, Notification};

/// Default IFSEI Classic TCP port.
pub const DEFAULT_PORT: u16 = 28000;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Where the gateway lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── TransportConfig ──────────────────────────────────────────────────

/// Socket deadlines for a gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound on the TCP handshake.
    pub connect_timeout: Duration,
    /// How long a session may stay silent before it is considered dead.
    pub read_timeout: Duration,
    /// Upper bound on flushing a single command.
    pub write_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(5),
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// Opens sessions to the gateway.
///
/// `connect` resolves only once the session is ready to carry commands;
/// any handshake the protocol needs happens inside it.
pub trait Connector: Send + Sync + 'static {
    type Sink: CommandSink;
    type Source: NotificationSource;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<(Self::Sink, Self::Source), Error>> + Send;
}

/// Write half of a gateway session.
pub trait CommandSink: Send + 'static {
    fn send(&mut self, command: &Command) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Read half of a gateway session.
pub trait NotificationSource: Send + 'static {
    /// Wait for the next notification. `Ok(None)` means the gateway closed
    /// the session cleanly.
    fn receive(&mut self) -> impl Future<Output = Result<Option<Notification>, Error>> + Send;
}

// ── TCP implementation ───────────────────────────────────────────────

/// [`Connector`] over plain TCP, framed by a caller-supplied codec.
///
/// The codec owns the IFSEI byte format; this type owns the socket and its
/// deadlines.
#[derive(Debug, Clone)]
pub struct TcpConnector<C> {
    codec: C,
    config: TransportConfig,
}

impl<C> TcpConnector<C> {
    pub fn new(codec: C, config: TransportConfig) -> Self {
        Self { codec, config }
    }
}

impl<C> Connector for TcpConnector<C>
where
    C: Decoder<Item = Notification, Error = Error>
        + Encoder<Command, Error = Error>
        + Clone
        + Unpin
        + Send
        + Sync
        + 'static,
{
    type Sink = TcpCommandSink<C>;
    type Source = TcpNotificationSource<C>;

    async fn connect(&self, endpoint: &Endpoint) -> Result<(Self::Sink, Self::Source), Error> {
        tracing::debug!(%endpoint, "opening gateway TCP session");

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "connect",
            timeout_ms: millis(self.config.connect_timeout),
        })?
        .map_err(|e| Error::Connect {
            addr: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        // Commands are tiny and latency matters more than throughput.
        stream.set_nodelay(true)?;

        let (read, write) = stream.into_split();
        let sink = TcpCommandSink {
            inner: FramedWrite::new(write, self.codec.clone()),
            write_timeout: self.config.write_timeout,
        };
        let source = TcpNotificationSource {
            inner: FramedRead::new(read, self.codec.clone()),
            read_timeout: self.config.read_timeout,
            after_decode_error: false,
        };

        tracing::info!(%endpoint, "gateway TCP session established");
        Ok((sink, source))
    }
}

/// Framed write half of a TCP session.
pub struct TcpCommandSink<C> {
    inner: FramedWrite<OwnedWriteHalf, C>,
    write_timeout: Duration,
}

impl<C> CommandSink for TcpCommandSink<C>
where
    C: Encoder<Command, Error = Error> + Unpin + Send + 'static,
{
    async fn send(&mut self, command: &Command) -> Result<(), Error> {
        tokio::time::timeout(self.write_timeout, self.inner.send(*command))
            .await
            .map_err(|_| Error::Timeout {
                operation: "write",
                timeout_ms: millis(self.write_timeout),
            })?
    }
}

/// Framed read half of a TCP session.
pub struct TcpNotificationSource<C> {
    inner: FramedRead<OwnedReadHalf, C>,
    read_timeout: Duration,
    /// `FramedRead` yields one `None` after a decode error even though the
    /// socket is still open.
    after_decode_error: bool,
}

impl<C> NotificationSource for TcpNotificationSource<C>
where
    C: Decoder<Item = Notification, Error = Error> + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Option<Notification>, Error> {
        loop {
            let frame = tokio::time::timeout(self.read_timeout, self.inner.next())
                .await
                .map_err(|_| Error::Timeout {
                    operation: "read",
                    timeout_ms: millis(self.read_timeout),
                })?;

            let resumed = std::mem::replace(&mut self.after_decode_error, false);
            match frame {
                None if resumed => {
                    tracing::trace!("resuming after undecodable frame");
                }
                Some(Err(Error::Codec(reason))) => {
                    self.after_decode_error = true;
                    return Err(Error::Codec(reason));
                }
                other => return other.transpose(),
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
