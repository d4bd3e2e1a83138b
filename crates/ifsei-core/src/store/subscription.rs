// ── Device listeners ──
//
// Per-device listener lists. Listeners run synchronously on the task that
// produced the event, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::model::{Device, DeviceId};

/// What a listener is told about.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The device state changed; carries the new snapshot.
    State(Arc<Device>),
    /// The gateway link went up (`true`) or down (`false`).
    Availability(bool),
}

pub type Listener = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_token: AtomicU64,
    by_device: DashMap<DeviceId, Vec<(u64, Listener)>>,
}

impl ListenerSet {
    pub(crate) fn insert(self: &Arc<Self>, device: DeviceId, listener: Listener) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.by_device
            .entry(device.clone())
            .or_default()
            .push((token, listener));
        Subscription {
            set: Arc::downgrade(self),
            device,
            token,
        }
    }

    fn remove(&self, device: &DeviceId, token: u64) {
        if let Some(mut listeners) = self.by_device.get_mut(device) {
            listeners.retain(|(t, _)| *t != token);
        }
    }

    /// Call every listener registered for `device`.
    ///
    /// The list is cloned out of the map first so a listener may subscribe
    /// or unsubscribe without deadlocking.
    pub(crate) fn notify(&self, device: &DeviceId, event: &DeviceEvent) {
        let listeners: Vec<Listener> = match self.by_device.get(device) {
            Some(entry) => entry.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn notify_all(&self, event: &DeviceEvent) {
        let mut devices: Vec<DeviceId> = self.by_device.iter().map(|e| e.key().clone()).collect();
        devices.sort();
        for device in devices {
            self.notify(&device, event);
        }
    }

    pub(crate) fn count(&self, device: &DeviceId) -> usize {
        self.by_device.get(device).map_or(0, |l| l.len())
    }
}

/// Keeps a listener registered. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    set: Weak<ListenerSet>,
    device: DeviceId,
    token: u64,
}

impl Subscription {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Unregister now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.remove(&self.device, self.token);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("device", &self.device)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
