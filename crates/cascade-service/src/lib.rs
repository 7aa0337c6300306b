//! Cascade service - wires the routing engine to a TOML config, an HTTP
//! provider and a JSONL request stream.

pub mod config;
pub mod jsonl;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cascade::catalog::InMemoryCatalogStore;
use cascade::escalation::{GenerativeProvider, HttpProvider};
use cascade::events::{EventBus, EventBusNotifier, EventFilter, Notifier, SharedEventBus, TracingNotifier};
use cascade::router::RouterOrchestrator;

pub use config::ServiceConfig;

/// Build a router from config using the HTTP provider.
pub async fn build_router(config: &ServiceConfig) -> Result<RouterOrchestrator> {
    let provider = HttpProvider::new(config.provider.clone())
        .context("failed to build HTTP provider")?;
    build_router_with(config, Arc::new(provider)).await
}

/// Build a router from config with an explicit provider.
pub async fn build_router_with(
    config: &ServiceConfig,
    provider: Arc<dyn GenerativeProvider>,
) -> Result<RouterOrchestrator> {
    build_router_with_sink(config, provider, Arc::new(TracingNotifier)).await
}

/// Build a router whose notifications, filtered by
/// `config.notifications`, are forwarded to `sink`.
pub async fn build_router_with_sink(
    config: &ServiceConfig,
    provider: Arc<dyn GenerativeProvider>,
    sink: Arc<dyn Notifier>,
) -> Result<RouterOrchestrator> {
    let store = InMemoryCatalogStore::new().shared();
    for entry in &config.routing.tenants {
        store
            .load_tenant(entry.config.tenant_id.clone(), entry.scenarios.clone())
            .with_context(|| format!("invalid catalog for tenant {}", entry.config.tenant_id))?;
    }

    let bus = EventBus::new().shared();
    let notifier: Arc<dyn Notifier> = Arc::new(EventBusNotifier::new(Arc::clone(&bus)));
    let filter = EventFilter::new().min_severity(config.notifications.min_severity);
    spawn_notification_forwarder(&bus, filter, sink);

    let router = RouterOrchestrator::builder(config.routing.router.clone())
        .catalog_store(store)
        .provider(provider)
        .notifier(notifier)
        .build()
        .await
        .context("failed to build router")?;
    for entry in &config.routing.tenants {
        router
            .register_tenant(entry.config.clone())
            .await
            .with_context(|| format!("failed to register tenant {}", entry.config.tenant_id))?;
    }
    info!(tenants = config.routing.tenants.len(), "Service router built");
    Ok(router)
}

/// Forward matching bus notifications to `sink` until the bus closes.
pub fn spawn_notification_forwarder(
    bus: &SharedEventBus,
    filter: EventFilter,
    sink: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe_filtered(filter);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(n) => sink.notify(n),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
