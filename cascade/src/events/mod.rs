//! Operational notifications.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Router    │────▶│   Notifier   │────▶│  EventBus /  │
//! │  (notify)    │     │   (trait)    │     │  tracing     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Delivery (paging, e-mail, dashboards) is a subscriber's concern.

pub mod bus;
pub mod notifier;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use notifier::{EventBusNotifier, Notifier, NullNotifier, RecordingNotifier, TracingNotifier};
pub use types::{Notification, ReasonCode, Severity};
