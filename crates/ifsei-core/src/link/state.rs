// ── Link state machine ──
//
// Pure transition logic for the gateway connection. No I/O and no timers:
// the supervisor feeds events in and acts on the resulting state.
//
// The machine runs in one of two modes. Until the first successful
// connection it is in `InitialAttempt`, where a failure with reconnect
// disabled is fatal. After that it is in `Recovery`, where any failure
// leads to reconnecting.

use serde::Serialize;

use crate::config::ReconnectPolicy;
use crate::error::CoreError;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "state")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for, or performing, reconnect attempt number `attempt`.
    Reconnecting { attempt: u32 },
    /// Terminal until a manual reconnect.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the supervisor has finished its first decision: connected,
    /// retrying or given up.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Reconnecting { .. } | Self::Failed
        )
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkEvent {
    /// Integration start.
    Start,
    /// Operator asked to try again.
    ManualReconnect,
    /// TCP handshake and protocol readiness succeeded.
    Connected,
    ConnectFailed,
    /// Read, write or idle failure on an established session.
    LinkLost,
    /// Operator gave up on an ongoing recovery.
    Abort,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkMode {
    /// No session has succeeded yet.
    InitialAttempt,
    /// At least one session succeeded.
    Recovery,
}

/// Why the machine ended up in [`ConnectionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "cause")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCause {
    /// The first connection failed with reconnect disabled.
    SetupFailed,
    /// The reconnect budget ran out after `attempts` failed reconnects.
    RetriesExhausted { attempts: u32 },
    /// The operator aborted recovery.
    Aborted,
}

/// Single-owner connection state machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: ConnectionState,
    mode: LinkMode,
    policy: ReconnectPolicy,
    failure: Option<FailureCause>,
}

impl StateMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            mode: LinkMode::InitialAttempt,
            policy,
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Set while the state is `Failed`, cleared on leaving it.
    pub fn failure(&self) -> Option<FailureCause> {
        self.failure
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Swap the reconnect policy. Takes effect on the next transition.
    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Apply `event`. On success returns the new state; illegal
    /// combinations leave the machine untouched.
    pub fn transition(&mut self, event: LinkEvent) -> Result<ConnectionState, CoreError> {
        use ConnectionState as S;
        use LinkEvent as E;

        let mut failure = None;
        let next = match (self.state, event) {
            (_, E::Shutdown) => {
                self.mode = LinkMode::InitialAttempt;
                S::Disconnected
            }
            (S::Disconnected | S::Failed, E::Start | E::ManualReconnect) => S::Connecting,
            (S::Connecting | S::Reconnecting { .. }, E::Connected) => {
                self.mode = LinkMode::Recovery;
                S::Connected
            }
            (S::Connecting, E::ConnectFailed) => {
                if self.mode == LinkMode::InitialAttempt && !self.policy.enabled {
                    failure = Some(FailureCause::SetupFailed);
                    S::Failed
                } else {
                    self.reconnecting(1, &mut failure)
                }
            }
            (S::Reconnecting { attempt }, E::ConnectFailed) => {
                self.reconnecting(attempt.saturating_add(1), &mut failure)
            }
            (S::Reconnecting { .. }, E::Abort) => {
                failure = Some(FailureCause::Aborted);
                S::Failed
            }
            (S::Connected, E::LinkLost) => self.reconnecting(1, &mut failure),
            (from, event) => return Err(CoreError::IllegalTransition { from, event }),
        };

        self.state = next;
        self.failure = failure;
        Ok(next)
    }

    /// `Reconnecting { attempt }`, or `Failed` once `attempt` is past the
    /// budget.
    fn reconnecting(&self, attempt: u32, failure: &mut Option<FailureCause>) -> ConnectionState {
        match self.policy.max_attempts {
            Some(max) if attempt > max => {
                *failure = Some(FailureCause::RetriesExhausted {
                    attempts: attempt - 1,
                });
                ConnectionState::Failed
            }
            _ => ConnectionState::Reconnecting { attempt },
        }
    }
}
