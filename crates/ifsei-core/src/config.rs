// ── Runtime bridge configuration ──
//
// These types describe where the gateway lives and how the bridge paces
// and recovers its link. They never touch disk; ifsei-config builds them.

use std::time::Duration;

use ifsei_api::Endpoint;
use serde::{Deserialize, Serialize};

/// Default minimum spacing between outgoing commands.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(200);

/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// How the link recovers from connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Retry after the very first connection attempt fails. Once the link
    /// has been up, losing it always triggers recovery.
    pub enabled: bool,
    /// Fixed wait between attempts.
    pub delay: Duration,
    /// Give up after this many failed reconnect attempts. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// Options that can be changed while the bridge runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// Minimum spacing between consecutive commands on the wire.
    pub send_delay: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            send_delay: DEFAULT_SEND_DELAY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Configuration for a single gateway bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub endpoint: Endpoint,
    pub options: BridgeOptions,
}

impl BridgeConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            options: BridgeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }
}
