//! Read-mostly snapshot cache in front of a [`CatalogStore`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::apply::ApplyOutcome;
use super::error::{CatalogError, CatalogResult};
use super::store::CatalogStore;
use super::types::CatalogSnapshot;
use crate::learning::pattern::LearnedPattern;
use crate::types::TenantId;

/// Shared reference to ScenarioCatalog
pub type SharedScenarioCatalog = Arc<ScenarioCatalog>;

#[derive(Debug, Default)]
struct CacheState {
    snapshots: HashMap<TenantId, Arc<CatalogSnapshot>>,
    /// Bumped by every invalidation. A fetch started under an older
    /// generation must not populate the cache.
    generations: HashMap<TenantId, u64>,
}

impl CacheState {
    fn generation(&self, tenant: &TenantId) -> u64 {
        self.generations.get(tenant).copied().unwrap_or(0)
    }
}

/// Per-tenant catalog cache.
///
/// Hot path is a read lock plus an `Arc` clone. A cold tenant awaits the
/// store once; pattern application and external edits invalidate the entry.
pub struct ScenarioCatalog {
    store: Arc<dyn CatalogStore>,
    cache: RwLock<CacheState>,
}

impl ScenarioCatalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(CacheState::default()),
        }
    }

    /// Create a shared reference to this catalog
    pub fn shared(self) -> SharedScenarioCatalog {
        Arc::new(self)
    }

    /// Consistent snapshot for one routing call.
    ///
    /// Fails with [`CatalogError::Empty`] when the tenant has no scenarios:
    /// routing against an empty catalog would be indistinguishable from a
    /// real no-match.
    pub async fn snapshot(&self, tenant: &TenantId) -> CatalogResult<Arc<CatalogSnapshot>> {
        let generation = {
            let cache = self.cache.read().map_err(|_| CatalogError::LockPoisoned)?;
            if let Some(hit) = cache.snapshots.get(tenant) {
                return Ok(Arc::clone(hit));
            }
            cache.generation(tenant)
        };

        let fetched = self.store.get_active_scenarios(tenant).await.map_err(|e| {
            warn!(tenant = %tenant, error = %e, "Catalog fetch failed");
            match e {
                CatalogError::Unavailable { .. } | CatalogError::Empty(_) => e,
                other => CatalogError::Unavailable {
                    tenant: tenant.clone(),
                    reason: other.to_string(),
                },
            }
        })?;
        if fetched.is_empty() {
            return Err(CatalogError::Empty(tenant.clone()));
        }

        if let Ok(mut cache) = self.cache.write() {
            if cache.generation(tenant) != generation {
                debug!(tenant = %tenant, version = fetched.version, "Catalog invalidated during fetch; not cached");
                return Ok(fetched);
            }
            // Never replace a newer snapshot that raced in ahead of us.
            let keep_existing = cache
                .snapshots
                .get(tenant)
                .is_some_and(|existing| existing.version > fetched.version);
            if !keep_existing {
                debug!(tenant = %tenant, version = fetched.version, scenarios = fetched.len(), "Catalog cached");
                cache.snapshots.insert(tenant.clone(), Arc::clone(&fetched));
            }
        }
        Ok(fetched)
    }

    /// Drop the cached snapshot so the next call refetches. A fetch already
    /// in flight for this tenant will not repopulate the cache.
    pub fn invalidate(&self, tenant: &TenantId) {
        if let Ok(mut cache) = self.cache.write() {
            cache.snapshots.remove(tenant);
            *cache.generations.entry(tenant.clone()).or_insert(0) += 1;
        }
    }

    /// Apply a pattern through the store and invalidate on change.
    pub async fn apply_pattern(
        &self,
        tenant: &TenantId,
        pattern: &LearnedPattern,
    ) -> CatalogResult<ApplyOutcome> {
        let outcome = self.store.apply_pattern(tenant, pattern).await?;
        if outcome.changed() {
            self.invalidate(tenant);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::InMemoryCatalogStore;
    use crate::catalog::types::Scenario;
    use crate::learning::pattern::PatternPayload;

    fn setup() -> (Arc<InMemoryCatalogStore>, ScenarioCatalog) {
        let store = InMemoryCatalogStore::new().shared();
        store
            .load_tenant(
                TenantId::from("acme"),
                vec![Scenario::new("hold", &["hold"], "One moment.")],
            )
            .unwrap();
        let catalog = ScenarioCatalog::new(store.clone());
        (store, catalog)
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_until_invalidated() {
        let (store, catalog) = setup();
        let t = TenantId::from("acme");
        let first = catalog.snapshot(&t).await.unwrap();
        store
            .upsert_scenario(&t, Scenario::new("bye", &["goodbye"], "Bye."))
            .unwrap();
        let still = catalog.snapshot(&t).await.unwrap();
        assert_eq!(first.version, still.version);

        catalog.invalidate(&t);
        let fresh = catalog.snapshot(&t).await.unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_an_error() {
        let store = InMemoryCatalogStore::new().shared();
        store.load_tenant(TenantId::from("empty"), vec![]).unwrap();
        let catalog = ScenarioCatalog::new(store);
        let err = catalog.snapshot(&TenantId::from("empty")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Empty(_)));
    }

    /// Holds the first fetch open until released.
    struct GatedStore {
        inner: Arc<InMemoryCatalogStore>,
        armed: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl CatalogStore for GatedStore {
        async fn get_active_scenarios(&self, tenant: &TenantId) -> CatalogResult<Arc<CatalogSnapshot>> {
            let snapshot = self.inner.get_active_scenarios(tenant).await?;
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(snapshot)
        }

        async fn apply_pattern(
            &self,
            tenant: &TenantId,
            pattern: &LearnedPattern,
        ) -> CatalogResult<ApplyOutcome> {
            self.inner.apply_pattern(tenant, pattern).await
        }
    }

    #[tokio::test]
    async fn test_fetch_in_flight_during_apply_is_not_cached() {
        let (inner, _) = setup();
        let gate = Arc::new(GatedStore {
            inner,
            armed: std::sync::atomic::AtomicBool::new(true),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let catalog = ScenarioCatalog::new(gate.clone()).shared();
        let t = TenantId::from("acme");

        let reader = {
            let catalog = Arc::clone(&catalog);
            let t = t.clone();
            tokio::spawn(async move { catalog.snapshot(&t).await })
        };
        gate.entered.notified().await;

        let pattern = LearnedPattern::observe(
            t.clone(),
            PatternPayload::Filler {
                word: "erm".to_string(),
            },
            0.9,
        );
        assert!(catalog.apply_pattern(&t, &pattern).await.unwrap().changed());
        gate.release.notify_one();

        let stale = reader.await.unwrap().unwrap();
        let current = gate.inner.snapshot(&t).unwrap();
        assert!(current.version > stale.version);

        let cached = catalog.snapshot(&t).await.unwrap();
        assert_eq!(cached.version, current.version);
        assert!(cached.learned_fillers.contains("erm"));
    }

    #[tokio::test]
    async fn test_apply_invalidates_cache() {
        let (_store, catalog) = setup();
        let t = TenantId::from("acme");
        let before = catalog.snapshot(&t).await.unwrap();
        let pattern = LearnedPattern::observe(
            t.clone(),
            PatternPayload::Filler {
                word: "erm".to_string(),
            },
            0.9,
        );
        let outcome = catalog.apply_pattern(&t, &pattern).await.unwrap();
        assert!(outcome.changed());
        let after = catalog.snapshot(&t).await.unwrap();
        assert!(after.version > before.version);
        assert!(after.learned_fillers.contains("erm"));
    }
}
