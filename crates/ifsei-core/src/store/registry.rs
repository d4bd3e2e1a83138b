// ── Device registry ──
//
// Configured devices keyed by id, plus a fixed index from gateway address
// to the devices bound on it. The device set never changes after
// construction; only device state does.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use dashmap::DashMap;
use ifsei_api::{Address, ReportedState};
use tracing::debug;

use super::subscription::{DeviceEvent, Listener, ListenerSet, Subscription};
use crate::error::CoreError;
use crate::model::{Binding, Device, DeviceConfig, DeviceId, DeviceKind, DeviceState};

/// All configured lights and covers and their last known state.
///
/// Reads are cheap snapshots (`Arc<Device>`). State mutations replace the
/// stored snapshot and then notify the device's listeners, outside of any
/// map lock.
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, Arc<Device>>,
    by_address: HashMap<Address, Vec<Binding>>,
    listeners: Arc<ListenerSet>,
}

impl DeviceRegistry {
    /// Build the registry from configuration.
    ///
    /// Device ids must be unique. An address may be shared by several
    /// devices only if none of them is a cover; a cover owns its scenes.
    pub fn from_configs(
        configs: impl IntoIterator<Item = DeviceConfig>,
    ) -> Result<Self, CoreError> {
        let devices = DashMap::new();
        let mut by_address: HashMap<Address, Vec<Binding>> = HashMap::new();
        let mut owner_is_cover: HashMap<Address, bool> = HashMap::new();

        for config in configs {
            if devices.contains_key(&config.id) {
                return Err(CoreError::DuplicateDevice {
                    id: config.id.to_string(),
                });
            }

            let is_cover = matches!(config.kind, DeviceKind::Cover(_));
            for (address, role) in config.kind.bindings() {
                let bindings = by_address.entry(address).or_default();
                match owner_is_cover.entry(address) {
                    Entry::Occupied(existing) if *existing.get() || is_cover => {
                        let first = bindings
                            .first()
                            .map(|b| b.device.to_string())
                            .unwrap_or_default();
                        return Err(CoreError::AddressConflict {
                            address,
                            first,
                            second: config.id.to_string(),
                        });
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(is_cover);
                    }
                }
                bindings.push(Binding {
                    device: config.id.clone(),
                    role,
                });
            }

            let device = Device::from_config(config);
            devices.insert(device.id.clone(), Arc::new(device));
        }

        debug!(
            devices = devices.len(),
            addresses = by_address.len(),
            "device registry built"
        );

        Ok(Self {
            devices,
            by_address,
            listeners: Arc::new(ListenerSet::default()),
        })
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id).map(|d| Arc::clone(d.value()))
    }

    /// Devices bound on `address`, with the role each binding plays.
    /// Empty for addresses nothing is configured on.
    pub fn resolve(&self, address: &Address) -> &[Binding] {
        self.by_address.get(address).map_or(&[], Vec::as_slice)
    }

    /// Snapshot of every device, ordered by id.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let mut out: Vec<Arc<Device>> = self
            .devices
            .iter()
            .map(|d| Arc::clone(d.value()))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Devices assigned to `zone`, ordered by id.
    pub fn devices_in_zone(&self, zone: &str) -> Vec<Arc<Device>> {
        let mut out: Vec<Arc<Device>> = self
            .devices
            .iter()
            .filter(|d| d.zone.as_deref() == Some(zone))
            .map(|d| Arc::clone(d.value()))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Distinct zone names, sorted.
    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self
            .devices
            .iter()
            .filter_map(|d| d.zone.clone())
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Apply a reported state through one binding. Listeners are notified
    /// only when the device state actually changed.
    pub fn apply(&self, binding: &Binding, reported: ReportedState) -> bool {
        self.update(&binding.device, |state| state.apply(binding.role, reported))
            .unwrap_or(false)
    }

    /// Mutate a device's state in place. `f` returns whether it changed
    /// anything.
    pub(crate) fn update(
        &self,
        id: &DeviceId,
        f: impl FnOnce(&mut DeviceState) -> bool,
    ) -> Result<bool, CoreError> {
        let snapshot = {
            let mut entry = self
                .devices
                .get_mut(id)
                .ok_or_else(|| CoreError::DeviceNotFound {
                    identifier: id.to_string(),
                })?;
            let mut state = entry.state;
            if !f(&mut state) {
                return Ok(false);
            }
            let device = Arc::make_mut(entry.value_mut());
            device.state = state;
            Arc::clone(entry.value())
        };

        self.listeners.notify(id, &DeviceEvent::State(snapshot));
        Ok(true)
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Register `listener` for changes to device `id`.
    pub fn subscribe(
        &self,
        id: &DeviceId,
        listener: impl Fn(&DeviceEvent) + Send + Sync + 'static,
    ) -> Result<Subscription, CoreError> {
        if !self.devices.contains_key(id) {
            return Err(CoreError::DeviceNotFound {
                identifier: id.to_string(),
            });
        }
        let listener: Listener = Arc::new(listener);
        Ok(self.listeners.insert(id.clone(), listener))
    }

    pub fn listener_count(&self, id: &DeviceId) -> usize {
        self.listeners.count(id)
    }

    /// Tell every listener the link went up or down.
    pub(crate) fn broadcast_availability(&self, available: bool) {
        self.listeners.notify_all(&DeviceEvent::Availability(available));
    }
}
