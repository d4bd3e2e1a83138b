use thiserror::Error;

/// Top-level error type for the `ifsei-api` crate.
///
/// Covers every failure the protocol boundary can report: establishing the
/// TCP session, socket timeouts, codec failures and a peer that went away.
/// `ifsei-core` maps these into link-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// The TCP handshake (or the protocol readiness check) failed.
    #[error("Cannot connect to gateway at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// No live session to send on.
    #[error("Gateway link is not connected")]
    NotConnected,

    /// The gateway closed the session.
    #[error("Gateway closed the connection")]
    Closed,

    // ── Transport ───────────────────────────────────────────────────
    /// A socket operation exceeded its deadline.
    #[error("Gateway {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Raw socket error.
    #[error("Gateway I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// The protocol codec could not encode a command or decode a frame.
    #[error("Protocol codec error: {0}")]
    Codec(String),
}

impl Error {
    /// Returns `true` if retrying the same operation on a fresh session
    /// could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Closed | Self::Timeout { .. } | Self::NotConnected => {
                true
            }
            Self::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::Unsupported
            ),
            Self::Codec(_) => false,
        }
    }

    /// Returns `true` if this error means the link itself is gone and the
    /// session must be torn down.
    pub fn is_link_failure(&self) -> bool {
        !matches!(self, Self::Codec(_) | Self::NotConnected)
    }
}
