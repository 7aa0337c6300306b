//! Budget storage collaborator.
//!
//! The store exposes exactly one mutation primitive, an atomic signed
//! adjustment. Everything the ledger does is built from it, so any backend
//! with an atomic increment (a SQL `UPDATE … RETURNING`, a Redis `INCRBYFLOAT`)
//! can stand in for the in-memory one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::{BudgetError, BudgetResult};
use super::types::{month_start, BudgetState};
use crate::types::TenantId;

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn read_budget_state(&self, tenant: &TenantId) -> BudgetResult<BudgetState>;

    /// Add `delta` (may be negative) to current spend and return the new
    /// state. Linearizable per tenant.
    async fn atomic_adjust(&self, tenant: &TenantId, delta: Decimal) -> BudgetResult<BudgetState>;

    /// Zero the spend and move to `period_start`. A no-op when the stored
    /// period is the same or newer.
    async fn reset_period(
        &self,
        tenant: &TenantId,
        period_start: DateTime<Utc>,
    ) -> BudgetResult<BudgetState>;

    /// Create the tenant's entry if missing, or update its limit.
    async fn ensure_tenant(
        &self,
        tenant: &TenantId,
        monthly_limit: Decimal,
    ) -> BudgetResult<BudgetState>;
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryBudgetStore {
    entries: Mutex<HashMap<TenantId, BudgetState>>,
}

impl InMemoryBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Seed a tenant with an explicit state (tests, restores).
    pub fn insert_state(&self, tenant: TenantId, state: BudgetState) -> BudgetResult<()> {
        let mut entries = self.entries.lock().map_err(|_| BudgetError::LockPoisoned)?;
        entries.insert(tenant, state);
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for InMemoryBudgetStore {
    async fn read_budget_state(&self, tenant: &TenantId) -> BudgetResult<BudgetState> {
        let entries = self.entries.lock().map_err(|_| BudgetError::LockPoisoned)?;
        entries
            .get(tenant)
            .cloned()
            .ok_or_else(|| BudgetError::UnknownTenant(tenant.clone()))
    }

    async fn atomic_adjust(&self, tenant: &TenantId, delta: Decimal) -> BudgetResult<BudgetState> {
        let mut entries = self.entries.lock().map_err(|_| BudgetError::LockPoisoned)?;
        let state = entries
            .get_mut(tenant)
            .ok_or_else(|| BudgetError::UnknownTenant(tenant.clone()))?;
        state.current_spend += delta;
        Ok(state.clone())
    }

    async fn reset_period(
        &self,
        tenant: &TenantId,
        period_start: DateTime<Utc>,
    ) -> BudgetResult<BudgetState> {
        let mut entries = self.entries.lock().map_err(|_| BudgetError::LockPoisoned)?;
        let state = entries
            .get_mut(tenant)
            .ok_or_else(|| BudgetError::UnknownTenant(tenant.clone()))?;
        if period_start > state.period_start {
            state.period_start = period_start;
            state.current_spend = Decimal::ZERO;
        }
        Ok(state.clone())
    }

    async fn ensure_tenant(
        &self,
        tenant: &TenantId,
        monthly_limit: Decimal,
    ) -> BudgetResult<BudgetState> {
        let mut entries = self.entries.lock().map_err(|_| BudgetError::LockPoisoned)?;
        let state = entries
            .entry(tenant.clone())
            .or_insert_with(|| BudgetState::new(monthly_limit, month_start(Utc::now())));
        state.monthly_limit = monthly_limit;
        Ok(state.clone())
    }
}
