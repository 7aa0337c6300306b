//! Catalog storage collaborator and its in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::apply::{apply_pattern, ApplyOutcome};
use super::error::{CatalogError, CatalogResult};
use super::types::{CatalogSnapshot, Scenario};
use crate::learning::pattern::LearnedPattern;
use crate::types::{ScenarioId, TenantId};

/// Source of tenant catalogs.
///
/// `apply_pattern` must be idempotent by pattern id.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Current snapshot of a tenant's active scenarios.
    async fn get_active_scenarios(&self, tenant: &TenantId) -> CatalogResult<Arc<CatalogSnapshot>>;

    /// Apply an approved pattern to a tenant's catalog.
    async fn apply_pattern(
        &self,
        tenant: &TenantId,
        pattern: &LearnedPattern,
    ) -> CatalogResult<ApplyOutcome>;
}

#[derive(Debug, Default)]
struct TenantCatalog {
    snapshot: Arc<CatalogSnapshot>,
    retired: HashSet<ScenarioId>,
}

/// Copy-on-write in-memory catalog store.
///
/// Every mutation builds a new snapshot and swaps the `Arc`; readers holding
/// the previous snapshot are unaffected.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    tenants: RwLock<HashMap<TenantId, TenantCatalog>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Replace a tenant's catalog. Scenario ids must be unique and valid.
    pub fn load_tenant(&self, tenant: TenantId, scenarios: Vec<Scenario>) -> CatalogResult<()> {
        let mut seen = HashSet::new();
        for s in &scenarios {
            s.validate()?;
            if !seen.insert(s.id.clone()) {
                return Err(CatalogError::InvalidScenario {
                    id: s.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }

        let mut tenants = self.tenants.write().map_err(|_| CatalogError::LockPoisoned)?;
        let entry = tenants.entry(tenant.clone()).or_default();
        if let Some(reused) = scenarios.iter().find(|s| entry.retired.contains(&s.id)) {
            return Err(CatalogError::RetiredId(reused.id.clone()));
        }
        let version = entry.snapshot.version + 1;
        let mut snapshot = CatalogSnapshot::new(tenant, scenarios);
        snapshot.version = version;
        entry.snapshot = Arc::new(snapshot);
        Ok(())
    }

    /// Insert or replace one scenario, keeping insertion order for updates.
    pub fn upsert_scenario(&self, tenant: &TenantId, scenario: Scenario) -> CatalogResult<u64> {
        scenario.validate()?;
        self.mutate(tenant, |entry| {
            if entry.retired.contains(&scenario.id) {
                return Err(CatalogError::RetiredId(scenario.id.clone()));
            }
            let mut next = (*entry.snapshot).clone();
            match next.position(&scenario.id) {
                Some(idx) => next.scenarios[idx] = scenario,
                None => next.scenarios.push(scenario),
            }
            next.version += 1;
            Ok(next)
        })
    }

    /// Delete a scenario and retire its id.
    pub fn remove_scenario(&self, tenant: &TenantId, id: &ScenarioId) -> CatalogResult<u64> {
        self.mutate(tenant, |entry| {
            let mut next = (*entry.snapshot).clone();
            let idx = next
                .position(id)
                .ok_or_else(|| CatalogError::ScenarioNotFound(id.clone()))?;
            next.scenarios.remove(idx);
            next.version += 1;
            entry.retired.insert(id.clone());
            Ok(next)
        })
    }

    /// Synchronous snapshot accessor (for tooling and tests).
    pub fn snapshot(&self, tenant: &TenantId) -> Option<Arc<CatalogSnapshot>> {
        let tenants = self.tenants.read().ok()?;
        tenants.get(tenant).map(|t| Arc::clone(&t.snapshot))
    }

    fn mutate<F>(&self, tenant: &TenantId, f: F) -> CatalogResult<u64>
    where
        F: FnOnce(&mut TenantCatalog) -> CatalogResult<CatalogSnapshot>,
    {
        let mut tenants = self.tenants.write().map_err(|_| CatalogError::LockPoisoned)?;
        let entry = tenants
            .get_mut(tenant)
            .ok_or_else(|| CatalogError::Unavailable {
                tenant: tenant.clone(),
                reason: "unknown tenant".to_string(),
            })?;
        let next = f(entry)?;
        let version = next.version;
        entry.snapshot = Arc::new(next);
        Ok(version)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_active_scenarios(&self, tenant: &TenantId) -> CatalogResult<Arc<CatalogSnapshot>> {
        let tenants = self.tenants.read().map_err(|_| CatalogError::LockPoisoned)?;
        tenants
            .get(tenant)
            .map(|t| Arc::clone(&t.snapshot))
            .ok_or_else(|| CatalogError::Unavailable {
                tenant: tenant.clone(),
                reason: "unknown tenant".to_string(),
            })
    }

    async fn apply_pattern(
        &self,
        tenant: &TenantId,
        pattern: &LearnedPattern,
    ) -> CatalogResult<ApplyOutcome> {
        let mut tenants = self.tenants.write().map_err(|_| CatalogError::LockPoisoned)?;
        let entry = tenants
            .get_mut(tenant)
            .ok_or_else(|| CatalogError::Unavailable {
                tenant: tenant.clone(),
                reason: "unknown tenant".to_string(),
            })?;
        let (next, outcome) = apply_pattern(&entry.snapshot, pattern, &entry.retired);
        if let Some(next) = next {
            debug!(tenant = %tenant, pattern_id = %pattern.id, version = next.version, "Pattern applied to catalog");
            entry.snapshot = Arc::new(next);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::from("acme")
    }

    #[tokio::test]
    async fn test_load_and_fetch() {
        let store = InMemoryCatalogStore::new();
        store
            .load_tenant(tenant(), vec![Scenario::new("hold", &["hold"], "ok")])
            .unwrap();
        let snap = store.get_active_scenarios(&tenant()).await.unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_unavailable() {
        let store = InMemoryCatalogStore::new();
        let err = store
            .get_active_scenarios(&TenantId::from("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let store = InMemoryCatalogStore::new();
        let err = store
            .load_tenant(
                tenant(),
                vec![
                    Scenario::new("a", &["x"], "1"),
                    Scenario::new("a", &["y"], "2"),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidScenario { .. }));
    }

    #[test]
    fn test_removed_id_never_reused() {
        let store = InMemoryCatalogStore::new();
        store
            .load_tenant(tenant(), vec![Scenario::new("a", &["x"], "1")])
            .unwrap();
        store.remove_scenario(&tenant(), &ScenarioId::from("a")).unwrap();
        let err = store
            .upsert_scenario(&tenant(), Scenario::new("a", &["x"], "again"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::RetiredId(_)));
    }

    #[test]
    fn test_snapshot_held_by_reader_is_not_mutated() {
        let store = InMemoryCatalogStore::new();
        store
            .load_tenant(tenant(), vec![Scenario::new("a", &["x"], "1")])
            .unwrap();
        let before = store.snapshot(&tenant()).unwrap();
        store
            .upsert_scenario(&tenant(), Scenario::new("b", &["y"], "2"))
            .unwrap();
        let after = store.snapshot(&tenant()).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert!(after.version > before.version);
    }
}
