//! Two-phase budget admission control.
//!
//! ```text
//! try_reserve ──► adjust(+amount) ──► over limit? ──yes──► adjust(-amount), deny
//!                                          │no
//!                                          ▼
//!                               reservation recorded
//!                                    │          │
//!                         commit(actual)     release
//!                   adjust(actual-amount)   adjust(-amount)
//! ```
//!
//! Under contention a reserve may be denied spuriously (another reserve's
//! transient increment is visible), but spend never ends above the limit
//! from a granted reservation. A reservation committed after its period
//! rolled over is charged to the new period, capped at what that period's
//! limit still allows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::error::{BudgetError, BudgetResult};
use super::store::BudgetStore;
use super::types::{month_start, BudgetState, Reservation, ReservationGrant, ReservationId};
use crate::types::TenantId;

/// Default share of the limit at which a warning is raised.
pub const DEFAULT_WARNING_RATIO: f64 = 0.8;

/// Reserve/commit/release over a [`BudgetStore`].
pub struct BudgetLedger {
    store: Arc<dyn BudgetStore>,
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
    warning_ratio: f64,
}

impl std::fmt::Debug for BudgetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetLedger")
            .field("warning_ratio", &self.warning_ratio)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

impl BudgetLedger {
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self {
            store,
            reservations: Mutex::new(HashMap::new()),
            warning_ratio: DEFAULT_WARNING_RATIO,
        }
    }

    pub fn with_warning_ratio(mut self, ratio: f64) -> Self {
        self.warning_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Create a shared reference to this ledger
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn store(&self) -> &Arc<dyn BudgetStore> {
        &self.store
    }

    /// Number of reservations not yet committed or released.
    pub fn outstanding(&self) -> usize {
        self.reservations.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Register a tenant or update its limit.
    pub async fn ensure_tenant(
        &self,
        tenant: &TenantId,
        monthly_limit: Decimal,
    ) -> BudgetResult<BudgetState> {
        self.store.ensure_tenant(tenant, monthly_limit).await
    }

    /// Current state, rolling the period over first if needed.
    pub async fn state(&self, tenant: &TenantId) -> BudgetResult<BudgetState> {
        self.rollover_if_due(tenant, Utc::now()).await
    }

    pub async fn try_reserve(
        &self,
        tenant: &TenantId,
        amount: Decimal,
    ) -> BudgetResult<ReservationGrant> {
        self.try_reserve_at(tenant, amount, Utc::now()).await
    }

    /// [`Self::try_reserve`] with an explicit clock.
    pub async fn try_reserve_at(
        &self,
        tenant: &TenantId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> BudgetResult<ReservationGrant> {
        if amount < Decimal::ZERO {
            return Err(BudgetError::InvalidAmount(amount));
        }
        self.rollover_if_due(tenant, now).await?;

        let after = self.store.atomic_adjust(tenant, amount).await?;
        // A free call is still refused once the limit is fully spent.
        let exhausted = amount.is_zero() && after.remaining().is_zero();
        if after.is_over_limit() || exhausted {
            let restored = self.store.atomic_adjust(tenant, -amount).await?;
            debug!(
                tenant = %tenant,
                amount = %amount,
                spend = %restored.current_spend,
                limit = %restored.monthly_limit,
                "Budget reservation denied"
            );
            return Ok(ReservationGrant::denied(restored.remaining()));
        }

        let before_ratio = {
            let before = BudgetState {
                current_spend: after.current_spend - amount,
                ..after.clone()
            };
            before.utilization()
        };
        let crossed_warning =
            before_ratio < self.warning_ratio && after.utilization() >= self.warning_ratio;
        if crossed_warning {
            warn!(
                tenant = %tenant,
                spend = %after.current_spend,
                limit = %after.monthly_limit,
                "Budget warning threshold crossed"
            );
        }

        let id = ReservationId::generate();
        let reservation = Reservation {
            id: id.clone(),
            tenant_id: tenant.clone(),
            amount,
            period_start: after.period_start,
            created_at: now,
        };
        let recorded = match self.reservations.lock() {
            Ok(mut map) => {
                map.insert(id.clone(), reservation);
                true
            }
            Err(_) => false,
        };
        if !recorded {
            self.store.atomic_adjust(tenant, -amount).await?;
            return Err(BudgetError::LockPoisoned);
        }

        Ok(ReservationGrant {
            granted: true,
            reservation_id: Some(id),
            remaining_after: after.remaining(),
            crossed_warning,
        })
    }

    /// Settle a reservation at its actual cost and return the amount charged.
    ///
    /// When `actual` exceeds the reservation and the extra would push spend
    /// over the limit, the charge is capped at the reserved amount.
    pub async fn commit(
        &self,
        tenant: &TenantId,
        reservation_id: &ReservationId,
        actual: Decimal,
    ) -> BudgetResult<Decimal> {
        let reservation = self.take(tenant, reservation_id)?;
        let actual = actual.max(Decimal::ZERO);
        let current = self.store.read_budget_state(tenant).await?;

        if current.period_start != reservation.period_start {
            // The period rolled over while the call was in flight and the
            // hold was wiped with it. The new period pays, within its limit.
            let charged = self.charge_within_limit(tenant, actual).await?;
            info!(
                tenant = %tenant,
                actual = %actual,
                charged = %charged,
                "Committed reservation across period rollover"
            );
            return Ok(charged);
        }

        let delta = actual - reservation.amount;
        let after = self.store.atomic_adjust(tenant, delta).await?;
        if delta > Decimal::ZERO && after.is_over_limit() {
            self.store.atomic_adjust(tenant, -delta).await?;
            warn!(
                tenant = %tenant,
                reserved = %reservation.amount,
                actual = %actual,
                "Actual cost exceeded reservation; charge capped"
            );
            return Ok(reservation.amount);
        }
        debug!(tenant = %tenant, reservation = %reservation_id, charged = %actual, "Reservation committed");
        Ok(actual)
    }

    /// Return a reservation's hold to the budget.
    pub async fn release(&self, tenant: &TenantId, reservation_id: &ReservationId) -> BudgetResult<()> {
        let reservation = self.take(tenant, reservation_id)?;
        let current = self.store.read_budget_state(tenant).await?;
        if current.period_start == reservation.period_start {
            self.store.atomic_adjust(tenant, -reservation.amount).await?;
        }
        debug!(tenant = %tenant, reservation = %reservation_id, "Reservation released");
        Ok(())
    }

    /// Add `amount` to spend, capped at what the limit still allows.
    async fn charge_within_limit(&self, tenant: &TenantId, amount: Decimal) -> BudgetResult<Decimal> {
        let after = self.store.atomic_adjust(tenant, amount).await?;
        if !after.is_over_limit() {
            return Ok(amount);
        }
        let restored = self.store.atomic_adjust(tenant, -amount).await?;
        let capped = amount.min(restored.remaining());
        if capped > Decimal::ZERO {
            let after = self.store.atomic_adjust(tenant, capped).await?;
            if !after.is_over_limit() {
                warn!(tenant = %tenant, actual = %amount, charged = %capped, "Charge capped at the monthly limit");
                return Ok(capped);
            }
            self.store.atomic_adjust(tenant, -capped).await?;
        }
        warn!(tenant = %tenant, actual = %amount, "No budget left for charge; recorded as zero");
        Ok(Decimal::ZERO)
    }

    fn take(&self, tenant: &TenantId, reservation_id: &ReservationId) -> BudgetResult<Reservation> {
        let mut map = self
            .reservations
            .lock()
            .map_err(|_| BudgetError::LockPoisoned)?;
        match map.get(reservation_id) {
            Some(r) if &r.tenant_id == tenant => {}
            _ => return Err(BudgetError::UnknownReservation(reservation_id.to_string())),
        }
        map.remove(reservation_id)
            .ok_or_else(|| BudgetError::UnknownReservation(reservation_id.to_string()))
    }

    async fn rollover_if_due(&self, tenant: &TenantId, now: DateTime<Utc>) -> BudgetResult<BudgetState> {
        let state = self.store.read_budget_state(tenant).await?;
        let period = month_start(now);
        if period > state.period_start {
            info!(tenant = %tenant, period = %period, "Budget period rolled over");
            return self.store.reset_period(tenant, period).await;
        }
        Ok(state)
    }
}
