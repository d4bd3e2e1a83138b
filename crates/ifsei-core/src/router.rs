// ── Notification router ──
//
// Fans gateway notifications out to the devices bound on their source
// address. Runs on the session's reader task, so notifications are applied
// one at a time in arrival order.

use std::sync::Arc;

use ifsei_api::Notification;
use tracing::{debug, trace};

use crate::store::DeviceRegistry;

/// What routing one notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// At least one device changed state.
    Applied { changed: usize },
    /// Bound devices already had this state.
    Unchanged,
    /// Nothing is configured on the source address; dropped.
    UnknownAddress,
}

#[derive(Clone)]
pub struct NotificationRouter {
    registry: Arc<DeviceRegistry>,
}

impl NotificationRouter {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn route(&self, notification: &Notification) -> RouteOutcome {
        let bindings = self.registry.resolve(&notification.source);
        if bindings.is_empty() {
            debug!(
                address = %notification.source,
                state = %notification.state,
                "notification for unconfigured address, dropping"
            );
            return RouteOutcome::UnknownAddress;
        }

        let changed = bindings
            .iter()
            .filter(|binding| self.registry.apply(binding, notification.state))
            .count();

        trace!(
            address = %notification.source,
            state = %notification.state,
            changed,
            "notification routed"
        );

        if changed == 0 {
            RouteOutcome::Unchanged
        } else {
            RouteOutcome::Applied { changed }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ifsei_api::{ChannelAddress, SceneId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{
        CoverMotion, CoverScenes, DeviceConfig, DeviceId, DeviceKind, Level, LightKind,
    };

    fn registry() -> Arc<DeviceRegistry> {
        Arc::new(
            DeviceRegistry::from_configs([
                DeviceConfig {
                    id: "lamp".into(),
                    name: "Lamp".into(),
                    zone: None,
                    kind: DeviceKind::Light(LightKind::Dimmable {
                        channel: ChannelAddress::new(2, 1),
                    }),
                },
                DeviceConfig {
                    id: "shade".into(),
                    name: "Shade".into(),
                    zone: None,
                    kind: DeviceKind::Cover(CoverScenes {
                        up: SceneId(1),
                        down: SceneId(2),
                        stop: SceneId(3),
                        position: None,
                    }),
                },
            ])
            .unwrap(),
        )
    }

    #[test]
    fn unknown_address_is_dropped_without_mutation() {
        let registry = registry();
        let before = registry.devices();
        let router = NotificationRouter::new(Arc::clone(&registry));

        let outcome = router.route(&Notification::level(ChannelAddress::new(9, 9), 80));

        assert_eq!(outcome, RouteOutcome::UnknownAddress);
        assert_eq!(registry.devices(), before);
    }

    #[test]
    fn routing_is_idempotent() {
        let registry = registry();
        let router = NotificationRouter::new(Arc::clone(&registry));
        let n = Notification::level(ChannelAddress::new(2, 1), 45);

        assert_eq!(router.route(&n), RouteOutcome::Applied { changed: 1 });
        let once = registry.get(&DeviceId::from("lamp")).unwrap();
        assert_eq!(router.route(&n), RouteOutcome::Unchanged);
        let twice = registry.get(&DeviceId::from("lamp")).unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.light_state().unwrap().brightness, Level::new(45));
    }

    #[test]
    fn scene_notifications_drive_covers() {
        let registry = registry();
        let router = NotificationRouter::new(Arc::clone(&registry));

        router.route(&Notification::scene(SceneId(1), true));
        let shade = registry.get(&DeviceId::from("shade")).unwrap();
        let state = shade.cover_state().unwrap();
        assert_eq!(state.motion, CoverMotion::Opening);
        assert!(!state.is_closed);

        router.route(&Notification::scene(SceneId(3), false));
        let shade = registry.get(&DeviceId::from("shade")).unwrap();
        assert_eq!(shade.cover_state().unwrap().motion, CoverMotion::Stopped);
    }

    #[test]
    fn later_notifications_win() {
        let registry = registry();
        let router = NotificationRouter::new(Arc::clone(&registry));
        let lamp = ChannelAddress::new(2, 1);

        for level in [10, 70, 30] {
            router.route(&Notification::level(lamp, level));
        }
        let state = registry.get(&DeviceId::from("lamp")).unwrap();
        assert_eq!(state.light_state().unwrap().brightness, Level::new(30));
    }
}
