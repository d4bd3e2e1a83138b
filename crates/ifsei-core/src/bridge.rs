// ── Bridge facade ──
//
// Full lifecycle management for one IFSEI gateway: owns the device
// registry, the command queue and the link, spawns the supervisor and
// dispatcher tasks, and hands out typed light/cover handles.

use std::sync::Arc;

use arc_swap::ArcSwap;
use ifsei_api::{Command, Connector};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, BridgeOptions};
use crate::dispatch::dispatch_loop;
use crate::entity::{CoverHandle, LightHandle};
use crate::error::CoreError;
use crate::link::{ConnectionState, Control, Link, LinkDiagnostics, LinkEvent, supervise};
use crate::model::{Device, DeviceConfig, DeviceId, DeviceKind, DeviceState};
use crate::queue::CommandQueue;
use crate::router::NotificationRouter;
use crate::store::{DeviceEvent, DeviceRegistry, Subscription};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Nothing touches the network
/// until [`start()`](Self::start).
pub struct Bridge<C: Connector> {
    inner: Arc<BridgeInner<C>>,
}

impl<C: Connector> Clone for Bridge<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<C: Connector> {
    config: BridgeConfig,
    registry: Arc<DeviceRegistry>,
    router: NotificationRouter,
    queue: Arc<CommandQueue>,
    link: Arc<Link<C>>,
    options: Arc<ArcSwap<BridgeOptions>>,
    cancel: CancellationToken,
    /// Token for the current run; cancelled on shutdown, replaced on start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> Drop for BridgeInner<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<C: Connector> Bridge<C> {
    /// Create a bridge for the configured devices. Does NOT connect.
    pub fn new(
        config: BridgeConfig,
        connector: C,
        devices: impl IntoIterator<Item = DeviceConfig>,
    ) -> Result<Self, CoreError> {
        let registry = Arc::new(DeviceRegistry::from_configs(devices)?);
        let router = NotificationRouter::new(Arc::clone(&registry));
        let link = Arc::new(Link::new(
            connector,
            config.endpoint.clone(),
            Arc::clone(&registry),
        ));
        let options = Arc::new(ArcSwap::from_pointee(config.options));
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                registry,
                router,
                queue: Arc::new(CommandQueue::new()),
                link,
                options,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Identifier for the gateway itself, stable for a given endpoint.
    pub fn gateway_id(&self) -> String {
        let endpoint = &self.inner.config.endpoint;
        format!("ifsei-{}-{}", endpoint.host, endpoint.port)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the link supervisor and the command dispatcher, then wait for
    /// the first connection outcome.
    ///
    /// Returns `Ok` once connected, or once the first attempt failed and
    /// recovery is running in the background. Returns the cause from
    /// [`failure()`](Self::failure) if the link ended up `Failed`:
    /// [`CoreError::SetupFailed`] when the first attempt failed with
    /// reconnect disabled, [`CoreError::RetriesExhausted`] when the reconnect
    /// budget was already spent. The tasks stay up so
    /// [`reconnect()`](Self::reconnect) can retry.
    pub async fn start(&self) -> Result<(), CoreError> {
        let cancel = {
            let mut handles = self.inner.task_handles.lock().await;
            if !handles.is_empty() {
                debug!("bridge already started");
                return self.settled(self.connection_state());
            }

            let cancel = self.inner.cancel.child_token();
            *self.inner.cancel_child.lock().await = cancel.clone();

            let (control_tx, control_rx) = mpsc::unbounded_channel();
            self.inner.link.install_control(control_tx);

            handles.push(tokio::spawn(supervise(
                Arc::clone(&self.inner.link),
                self.inner.router.clone(),
                Arc::clone(&self.inner.options),
                control_rx,
                cancel.clone(),
            )));
            handles.push(tokio::spawn(dispatch_loop(
                Arc::clone(&self.inner.queue),
                Arc::clone(&self.inner.link),
                Arc::clone(&self.inner.options),
                cancel.clone(),
            )));
            cancel
        };
        info!(endpoint = %self.inner.config.endpoint, "bridge started");

        let mut state_rx = self.inner.link.subscribe();
        let settled = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::ShutDown),
            r = state_rx.wait_for(ConnectionState::is_settled) => r.map(|s| *s),
        };
        let state = settled.map_err(|_| CoreError::ShutDown)?;
        self.settled(state)
    }

    fn settled(&self, state: ConnectionState) -> Result<(), CoreError> {
        match state {
            ConnectionState::Failed => Err(self.failure().unwrap_or_else(|| {
                CoreError::SetupFailed {
                    addr: self.inner.config.endpoint.to_string(),
                    reason: "connection failed".into(),
                }
            })),
            ConnectionState::Reconnecting { attempt } => {
                warn!(
                    endpoint = %self.inner.config.endpoint,
                    attempt,
                    "gateway unreachable, retrying in the background"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Stop all background tasks and close the session.
    ///
    /// Idempotent. Queued commands are kept and drain after the next
    /// [`start()`](Self::start).
    pub async fn shutdown(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        if handles.is_empty() {
            return;
        }
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "bridge task ended abnormally");
            }
        }
        if self.inner.queue.is_empty() {
            debug!("bridge shut down");
        } else {
            debug!(
                pending = self.inner.queue.len(),
                "bridge shut down, queued commands kept for the next start"
            );
        }
    }

    /// Ask for a connection attempt now.
    ///
    /// From `Failed` this is the manual retry; while reconnecting it skips
    /// the remaining delay; after shutdown it starts the bridge again.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        match self.connection_state() {
            ConnectionState::Disconnected => self.start().await,
            ConnectionState::Failed | ConnectionState::Reconnecting { .. } => {
                if self.inner.link.control(Control::Reconnect) {
                    Ok(())
                } else {
                    Err(CoreError::ShutDown)
                }
            }
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
        }
    }

    /// Give up on an ongoing recovery. The link moves to `Failed`.
    pub fn abort_reconnect(&self) -> Result<(), CoreError> {
        let state = self.connection_state();
        if !matches!(state, ConnectionState::Reconnecting { .. }) {
            return Err(CoreError::IllegalTransition {
                from: state,
                event: LinkEvent::Abort,
            });
        }
        if self.inner.link.control(Control::Abort) {
            Ok(())
        } else {
            Err(CoreError::ShutDown)
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Queue a command for the gateway. Never blocks; accepted even while
    /// the link is down.
    pub fn submit(&self, command: Command) {
        debug!(%command, "command queued");
        self.inner.queue.submit(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.inner.queue.len()
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.inner.registry.get(id)
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.registry.devices()
    }

    pub fn devices_in_zone(&self, zone: &str) -> Vec<Arc<Device>> {
        self.inner.registry.devices_in_zone(zone)
    }

    /// Register a listener for one device's state and availability.
    pub fn subscribe(
        &self,
        id: &DeviceId,
        listener: impl Fn(&DeviceEvent) + Send + Sync + 'static,
    ) -> Result<Subscription, CoreError> {
        self.inner.registry.subscribe(id, listener)
    }

    pub fn light(&self, id: &DeviceId) -> Result<LightHandle<C>, CoreError> {
        let device = self.require(id)?;
        match device.kind {
            DeviceKind::Light(kind) => Ok(LightHandle::new(self.clone(), device.id.clone(), kind)),
            DeviceKind::Cover(_) => Err(CoreError::UnsupportedOperation {
                operation: "light control".into(),
                device: id.to_string(),
            }),
        }
    }

    pub fn cover(&self, id: &DeviceId) -> Result<CoverHandle<C>, CoreError> {
        let device = self.require(id)?;
        match device.kind {
            DeviceKind::Cover(scenes) => {
                Ok(CoverHandle::new(self.clone(), device.id.clone(), scenes))
            }
            DeviceKind::Light(_) => Err(CoreError::UnsupportedOperation {
                operation: "cover control".into(),
                device: id.to_string(),
            }),
        }
    }

    fn require(&self, id: &DeviceId) -> Result<Arc<Device>, CoreError> {
        self.device(id).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: id.to_string(),
        })
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.link.state()
    }

    /// Why the link is `Failed`, or `None` in any other state.
    pub fn failure(&self) -> Option<CoreError> {
        self.inner.link.failure()
    }

    /// Subscribe to connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.link.subscribe()
    }

    /// Entities are available exactly while the link is connected.
    pub fn is_available(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn options(&self) -> BridgeOptions {
        **self.inner.options.load()
    }

    /// Apply new options to the running bridge. The send delay applies from
    /// the next dispatched command, the reconnect policy from the next
    /// connection decision.
    pub fn update_options(&self, options: BridgeOptions) {
        self.inner.options.store(Arc::new(options));
        info!(
            send_delay_ms = u64::try_from(options.send_delay.as_millis()).unwrap_or(u64::MAX),
            reconnect = options.reconnect.enabled,
            reconnect_delay_s = options.reconnect.delay.as_secs(),
            max_attempts = ?options.reconnect.max_attempts,
            "bridge options updated"
        );
    }

    pub fn diagnostics(&self) -> LinkDiagnostics {
        self.inner.link.diagnostics(self.inner.queue.len())
    }

    pub(crate) fn update_device(
        &self,
        id: &DeviceId,
        f: impl FnOnce(&mut DeviceState) -> bool,
    ) -> Result<bool, CoreError> {
        self.inner.registry.update(id, f)
    }

    #[cfg(test)]
    pub(crate) fn drain_pending(&self) -> Vec<Command> {
        std::iter::from_fn(|| self.inner.queue.try_next())
            .map(|q| q.command)
            .collect()
    }
}
