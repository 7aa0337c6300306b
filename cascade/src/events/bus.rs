//! Broadcast bus for router notifications
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never blocks and never
//! fails because nobody is listening.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::{Notification, ReasonCode, Severity};
use crate::types::TenantId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Notification bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish to all subscribers. Returns the number of receivers reached.
    pub fn publish(&self, notification: Notification) -> usize {
        let reason = notification.reason;
        match self.sender.send(notification) {
            Ok(count) => {
                debug!(%reason, receivers = count, "Notification published");
                count
            }
            Err(_) => {
                debug!(%reason, "Notification published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub tenant_id: Option<TenantId>,
    pub reasons: Option<Vec<ReasonCode>>,
    pub min_severity: Option<Severity>,
}

impl EventFilter {
    /// Create a new empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant: &TenantId) -> Self {
        self.tenant_id = Some(tenant.clone());
        self
    }

    pub fn reasons(mut self, reasons: Vec<ReasonCode>) -> Self {
        self.reasons = Some(reasons);
        self
    }

    /// Only notifications at or above `severity`
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn matches(&self, n: &Notification) -> bool {
        if self.min_severity.is_some_and(|min| n.severity < min) {
            return false;
        }
        if let Some(ref t) = self.tenant_id {
            if &n.tenant_id != t {
                return false;
            }
        }
        if let Some(ref reasons) = self.reasons {
            if !reasons.contains(&n.reason) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields notifications matching a filter
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<Notification>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<Notification>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching notification
    pub async fn recv(&mut self) -> Result<Notification, broadcast::error::RecvError> {
        loop {
            let n = self.receiver.recv().await?;
            if self.filter.matches(&n) {
                return Ok(n);
            }
        }
    }
}

impl EventBus {
    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}
