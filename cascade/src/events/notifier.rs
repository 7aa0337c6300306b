//! Fire-and-forget notification sinks.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::bus::SharedEventBus;
use super::types::{Notification, Severity};

/// Delivery of operational notifications. Implementations must not block
/// and must not fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Publishes onto an [`EventBus`](super::bus::EventBus).
pub struct EventBusNotifier {
    bus: SharedEventBus,
}

impl EventBusNotifier {
    pub fn new(bus: SharedEventBus) -> Self {
        Self { bus }
    }
}

impl Notifier for EventBusNotifier {
    fn notify(&self, notification: Notification) {
        self.bus.publish(notification);
    }
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Info => info!(tenant = %n.tenant_id, reason = %n.reason, detail = %n.detail, "Notification"),
            Severity::Warning | Severity::Critical => {
                warn!(tenant = %n.tenant_id, reason = %n.reason, severity = %n.severity, detail = %n.detail, "Notification")
            }
        }
    }
}

/// Drops everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Keeps every notification in memory; for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this notifier
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::EventBus;
    use crate::events::types::ReasonCode;
    use crate::types::TenantId;

    #[tokio::test]
    async fn test_event_bus_notifier_forwards() {
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let notifier = EventBusNotifier::new(Arc::clone(&bus));
        notifier.notify(Notification::new(TenantId::from("acme"), ReasonCode::Tier3Error, "timeout"));
        assert_eq!(rx.recv().await.unwrap().reason, ReasonCode::Tier3Error);
    }

    #[test]
    fn test_recording_notifier_keeps_order() {
        let rec = RecordingNotifier::new();
        rec.notify(Notification::new(TenantId::from("a"), ReasonCode::NoMatch, "1"));
        rec.notify(Notification::new(TenantId::from("a"), ReasonCode::BudgetWarning, "2"));
        let seen = rec.notifications();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].reason, ReasonCode::BudgetWarning);
        NullNotifier.notify(seen[0].clone());
        TracingNotifier.notify(seen[1].clone());
    }
}
