// ── Core error types ──
//
// Errors surfaced by ifsei-core. Socket-level detail from ifsei-api is
// folded into link-level variants by the `From<ifsei_api::Error>` impl;
// consumers never match on transport errors directly.

use ifsei_api::Address;
use thiserror::Error;

use crate::link::{ConnectionState, LinkEvent};

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// The very first connection attempt failed and reconnect is disabled.
    #[error("Cannot connect to gateway at {addr}: {reason}")]
    SetupFailed { addr: String, reason: String },

    #[error("Gave up reconnecting to gateway after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Gateway link failure: {reason}")]
    LinkFailure { reason: String },

    #[error("Gateway {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Gateway link is not connected")]
    NotConnected,

    #[error("Bridge has been shut down")]
    ShutDown,

    // ── State machine ────────────────────────────────────────────────
    #[error("Illegal link transition: {event} while {from}")]
    IllegalTransition {
        from: ConnectionState,
        event: LinkEvent,
    },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Duplicate device id: {id}")]
    DuplicateDevice { id: String },

    #[error("Address {address} is bound by both {first} and {second}")]
    AddressConflict {
        address: Address,
        first: String,
        second: String,
    },

    #[error("Operation not supported: {operation} on {device}")]
    UnsupportedOperation { operation: String, device: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl CoreError {
    /// Whether the error is the link's fault rather than the caller's.
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Self::SetupFailed { .. }
                | Self::RetriesExhausted { .. }
                | Self::LinkFailure { .. }
                | Self::Timeout { .. }
                | Self::NotConnected
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ifsei_api::Error> for CoreError {
    fn from(err: ifsei_api::Error) -> Self {
        match err {
            ifsei_api::Error::Connect { addr, reason } => CoreError::LinkFailure {
                reason: format!("connect to {addr} failed: {reason}"),
            },
            ifsei_api::Error::NotConnected => CoreError::NotConnected,
            ifsei_api::Error::Closed => CoreError::LinkFailure {
                reason: "gateway closed the connection".into(),
            },
            ifsei_api::Error::Timeout {
                operation,
                timeout_ms,
            } => CoreError::Timeout {
                operation,
                timeout_ms,
            },
            ifsei_api::Error::Io(e) => CoreError::LinkFailure {
                reason: e.to_string(),
            },
            ifsei_api::Error::Codec(message) => CoreError::Protocol { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_timeout_keeps_its_operation() {
        let err = CoreError::from(ifsei_api::Error::Timeout {
            operation: "write",
            timeout_ms: 5000,
        });
        assert!(matches!(
            err,
            CoreError::Timeout {
                operation: "write",
                timeout_ms: 5000
            }
        ));
        assert!(err.is_link_error());
    }

    #[test]
    fn codec_failures_become_protocol_errors() {
        let err = CoreError::from(ifsei_api::Error::Codec("bad frame".into()));
        assert!(matches!(err, CoreError::Protocol { .. }));
        assert!(!err.is_link_error());
    }

    #[test]
    fn illegal_transition_names_state_and_event() {
        let err = CoreError::IllegalTransition {
            from: ConnectionState::Connected,
            event: LinkEvent::Start,
        };
        assert_eq!(err.to_string(), "Illegal link transition: start while connected");
    }
}
