// ── Link manager ──
//
// Owns the gateway session: the live command sink, the notification
// reader, and the supervisor task that connects, detects failures and
// reconnects. The supervisor is the only owner of the state machine;
// everything else observes state through a `watch` channel and talks to
// the supervisor through a control channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use ifsei_api::{Command, CommandSink, Connector, Endpoint, NotificationSource};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{ConnectionState, FailureCause, LinkEvent, StateMachine};
use crate::config::BridgeOptions;
use crate::error::CoreError;
use crate::router::NotificationRouter;
use crate::store::DeviceRegistry;

/// Messages from the rest of the bridge to the supervisor.
#[derive(Debug, Clone)]
pub(crate) enum Control {
    /// A session failed. Faults from older sessions are ignored.
    Fault { generation: u64, error: CoreError },
    /// Retry now: leave `Failed`, or skip the remaining reconnect delay.
    Reconnect,
    /// Stop an ongoing recovery.
    Abort,
}

/// Point-in-time view of the link for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDiagnostics {
    pub endpoint: String,
    pub state: ConnectionState,
    /// Sessions opened since the bridge was created.
    pub sessions: u64,
    pub last_error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub queued_commands: usize,
}

struct ActiveSink<S> {
    generation: u64,
    sink: S,
}

// ── Link ─────────────────────────────────────────────────────────────

pub(crate) struct Link<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    registry: Arc<DeviceRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    sink: Mutex<Option<ActiveSink<C::Sink>>>,
    control_tx: ArcSwap<mpsc::UnboundedSender<Control>>,
    generation: AtomicU64,
    last_error: ArcSwapOption<CoreError>,
    /// Why the link is `Failed`; empty in every other state.
    failure: ArcSwapOption<CoreError>,
    last_connected_at: ArcSwapOption<DateTime<Utc>>,
}

impl<C: Connector> Link<C> {
    pub(crate) fn new(connector: C, endpoint: Endpoint, registry: Arc<DeviceRegistry>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        // Replaced on every start; until then control messages go nowhere.
        let (control_tx, _) = mpsc::unbounded_channel();
        Self {
            connector,
            endpoint,
            registry,
            state_tx,
            sink: Mutex::new(None),
            control_tx: ArcSwap::from_pointee(control_tx),
            generation: AtomicU64::new(0),
            last_error: ArcSwapOption::empty(),
            failure: ArcSwapOption::empty(),
            last_connected_at: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn last_error(&self) -> Option<CoreError> {
        self.last_error.load_full().map(|e| (*e).clone())
    }

    pub(crate) fn failure(&self) -> Option<CoreError> {
        self.failure.load_full().map(|e| (*e).clone())
    }

    pub(crate) fn diagnostics(&self, queued_commands: usize) -> LinkDiagnostics {
        LinkDiagnostics {
            endpoint: self.endpoint.to_string(),
            state: self.state(),
            sessions: self.generation.load(Ordering::Relaxed),
            last_error: self.last_error().as_ref().map(ToString::to_string),
            last_connected_at: self.last_connected_at.load_full().map(|t| *t),
            queued_commands,
        }
    }

    pub(crate) fn install_control(&self, tx: mpsc::UnboundedSender<Control>) {
        self.control_tx.store(Arc::new(tx));
    }

    /// Hand a message to the supervisor. Returns `false` if none is running.
    pub(crate) fn control(&self, message: Control) -> bool {
        self.control_tx.load().send(message).is_ok()
    }

    /// Send one command on the live session.
    ///
    /// A link-level failure tears the sink down and reports a fault, so
    /// the supervisor starts recovery even if the reader has not noticed.
    pub(crate) async fn send(&self, command: &Command) -> Result<(), ifsei_api::Error> {
        let mut slot = self.sink.lock().await;
        let Some(active) = slot.as_mut() else {
            return Err(ifsei_api::Error::NotConnected);
        };

        let result = active.sink.send(command).await;
        if let Err(ref e) = result {
            if e.is_link_failure() {
                let generation = active.generation;
                *slot = None;
                self.control(Control::Fault {
                    generation,
                    error: CoreError::LinkFailure {
                        reason: e.to_string(),
                    },
                });
            }
        }
        result
    }

    fn record_error(&self, error: CoreError) {
        self.last_error.store(Some(Arc::new(error)));
    }

    /// Install a fresh sink and return the new session's generation.
    async fn open_session(&self, sink: C::Sink) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.sink.lock().await = Some(ActiveSink { generation, sink });
        generation
    }

    async fn close_session(&self) {
        self.sink.lock().await.take();
    }

    /// Feed `event` to the machine and publish the result. The failure
    /// cause is stored before the state so `Failed` is never observed
    /// without one.
    fn apply(&self, machine: &mut StateMachine, event: LinkEvent) -> bool {
        match machine.transition(event) {
            Ok(state) => {
                let failure = machine.failure().map(|cause| self.failure_error(cause));
                if let Some(ref error) = failure {
                    error!(endpoint = %self.endpoint, %error, "gateway link failed");
                }
                self.failure.store(failure.map(Arc::new));
                self.publish(state);
                true
            }
            Err(e) => {
                warn!(error = %e, "ignoring link event");
                false
            }
        }
    }

    fn failure_error(&self, cause: FailureCause) -> CoreError {
        match cause {
            FailureCause::SetupFailed => CoreError::SetupFailed {
                addr: self.endpoint.to_string(),
                reason: self
                    .last_error()
                    .as_ref()
                    .map_or_else(|| "connection failed".into(), ToString::to_string),
            },
            FailureCause::RetriesExhausted { attempts } => CoreError::RetriesExhausted { attempts },
            FailureCause::Aborted => CoreError::LinkFailure {
                reason: "reconnect aborted".into(),
            },
        }
    }

    fn publish(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous == state {
            return;
        }
        info!(
            endpoint = %self.endpoint,
            from = %previous,
            to = %state,
            "gateway link state changed"
        );
        if state.is_connected() {
            self.last_connected_at.store(Some(Arc::new(Utc::now())));
        }
        if previous.is_connected() != state.is_connected() {
            self.registry.broadcast_availability(state.is_connected());
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────────

/// Supervisor task. Runs until `cancel` fires, then closes the session and
/// leaves the link `Disconnected`.
pub(crate) async fn supervise<C: Connector>(
    link: Arc<Link<C>>,
    router: NotificationRouter,
    options: Arc<ArcSwap<BridgeOptions>>,
    mut control: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
) {
    let mut machine = StateMachine::new(options.load().reconnect);
    let mut supervisor = Supervisor {
        link: &link,
        router: &router,
        options: &options,
        control: &mut control,
        cancel: &cancel,
        machine: &mut machine,
    };
    supervisor.run().await;

    link.close_session().await;
    link.apply(&mut machine, LinkEvent::Shutdown);
    debug!(endpoint = %link.endpoint, "link supervisor stopped");
}

struct Supervisor<'a, C: Connector> {
    link: &'a Link<C>,
    router: &'a NotificationRouter,
    options: &'a ArcSwap<BridgeOptions>,
    control: &'a mut mpsc::UnboundedReceiver<Control>,
    cancel: &'a CancellationToken,
    machine: &'a mut StateMachine,
}

enum Wake {
    Retry,
    Aborted,
    Cancelled,
}

impl<C: Connector> Supervisor<'_, C> {
    async fn run(&mut self) {
        if !self.apply(LinkEvent::Start) {
            return;
        }

        loop {
            match self.machine.state() {
                ConnectionState::Connecting => {}
                ConnectionState::Reconnecting { attempt } => {
                    match self.wait_before_retry(attempt).await {
                        Wake::Retry => {}
                        Wake::Aborted => continue,
                        Wake::Cancelled => return,
                    }
                }
                ConnectionState::Failed => {
                    if !self.wait_for_manual_reconnect().await {
                        return;
                    }
                    continue;
                }
                ConnectionState::Connected | ConnectionState::Disconnected => return,
            }

            if !self.attempt().await {
                return;
            }
        }
    }

    /// Feed `event` to the machine under the current reconnect policy.
    fn apply(&mut self, event: LinkEvent) -> bool {
        self.machine.set_policy(self.options.load().reconnect);
        self.link.apply(self.machine, event)
    }

    /// One connection attempt and, if it succeeds, the whole session.
    /// Returns `false` when cancelled.
    ///
    /// An abort that arrives mid-attempt ends recovery at once; any other
    /// control message is stale by the time the attempt finishes and is
    /// dropped.
    async fn attempt(&mut self) -> bool {
        let link = self.link;
        let state = self.machine.state();
        debug!(endpoint = %link.endpoint, %state, "connecting to gateway");

        let recovering = matches!(state, ConnectionState::Reconnecting { .. });
        let mut connect = std::pin::pin!(link.connector.connect(&link.endpoint));
        let result = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                message = self.control.recv() => match message {
                    Some(Control::Abort) if recovering => {
                        info!(endpoint = %link.endpoint, "reconnect aborted during attempt");
                        self.apply(LinkEvent::Abort);
                        return true;
                    }
                    Some(message) => {
                        debug!(?message, "ignoring control message while connecting");
                    }
                    None => return false,
                },
                r = connect.as_mut() => break r,
            }
        };

        match result {
            Ok((sink, source)) => {
                let generation = link.open_session(sink).await;
                self.apply(LinkEvent::Connected);
                info!(endpoint = %link.endpoint, generation, "gateway session open");

                let lost = self.run_session(source, generation).await;
                link.close_session().await;

                let Some(error) = lost else {
                    return false;
                };
                warn!(endpoint = %link.endpoint, generation, %error, "gateway link lost");
                link.record_error(error);
                self.apply(LinkEvent::LinkLost);
            }
            Err(e) => {
                warn!(
                    endpoint = %link.endpoint,
                    error = %e,
                    transient = e.is_transient(),
                    "gateway connection attempt failed"
                );
                link.record_error(CoreError::from(e));
                self.apply(LinkEvent::ConnectFailed);
            }
        }
        true
    }

    /// Drive one session until it faults (returns the error) or the
    /// supervisor is cancelled (returns `None`).
    async fn run_session(&mut self, source: C::Source, generation: u64) -> Option<CoreError> {
        let session_cancel = self.cancel.child_token();
        let faults = (**self.link.control_tx.load()).clone();
        let reader = tokio::spawn(read_loop(
            source,
            self.router.clone(),
            faults,
            generation,
            session_cancel.clone(),
        ));

        let outcome = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break None,
                message = self.control.recv() => match message {
                    Some(Control::Fault { generation: g, error }) if g == generation => {
                        break Some(error);
                    }
                    Some(Control::Fault { generation: g, .. }) => {
                        debug!(generation = g, "ignoring fault from an earlier session");
                    }
                    Some(Control::Reconnect) => {
                        debug!("already connected, ignoring reconnect request");
                    }
                    Some(Control::Abort) => debug!("no recovery in progress, ignoring abort"),
                    None => break None,
                },
            }
        };

        session_cancel.cancel();
        if let Err(e) = reader.await {
            warn!(error = %e, generation, "notification reader ended abnormally");
        }
        outcome
    }

    async fn wait_before_retry(&mut self, attempt: u32) -> Wake {
        let delay = self.options.load().reconnect.delay;
        info!(
            endpoint = %self.link.endpoint,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect attempt"
        );

        let mut sleep = std::pin::pin!(tokio::time::sleep(delay));
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Wake::Cancelled,
                message = self.control.recv() => match message {
                    Some(Control::Reconnect) => {
                        info!(attempt, "manual reconnect requested, skipping delay");
                        return Wake::Retry;
                    }
                    Some(Control::Abort) => {
                        info!(attempt, "reconnect aborted");
                        self.apply(LinkEvent::Abort);
                        return Wake::Aborted;
                    }
                    Some(Control::Fault { .. }) => {}
                    None => return Wake::Cancelled,
                },
                () = sleep.as_mut() => return Wake::Retry,
            }
        }
    }

    /// Park in `Failed` until someone asks to reconnect. Returns `false`
    /// when cancelled.
    async fn wait_for_manual_reconnect(&mut self) -> bool {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                message = self.control.recv() => match message {
                    Some(Control::Reconnect) => {
                        info!(endpoint = %self.link.endpoint, "manual reconnect requested");
                        return self.apply(LinkEvent::ManualReconnect);
                    }
                    Some(Control::Abort | Control::Fault { .. }) => {}
                    None => return false,
                },
            }
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────

/// Pull notifications off one session and route them in arrival order.
/// Reports a fault and exits when the session ends.
async fn read_loop<S: NotificationSource>(
    mut source: S,
    router: NotificationRouter,
    faults: mpsc::UnboundedSender<Control>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            r = source.receive() => r,
        };

        let error = match received {
            Ok(Some(notification)) => {
                router.route(&notification);
                continue;
            }
            Ok(None) => CoreError::from(ifsei_api::Error::Closed),
            Err(e) => {
                let error = CoreError::from(e);
                if !error.is_link_error() {
                    warn!(%error, generation, "skipping undecodable notification");
                    continue;
                }
                error
            }
        };

        let _ = faults.send(Control::Fault { generation, error });
        return;
    }
}
