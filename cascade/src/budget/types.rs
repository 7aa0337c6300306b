//! Budget data types.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// First instant of the UTC calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// A tenant's spend for the current period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub monthly_limit: Decimal,
    pub current_spend: Decimal,
    pub period_start: DateTime<Utc>,
}

impl BudgetState {
    pub fn new(monthly_limit: Decimal, period_start: DateTime<Utc>) -> Self {
        Self {
            monthly_limit,
            current_spend: Decimal::ZERO,
            period_start,
        }
    }

    /// Limit minus spend, never negative.
    pub fn remaining(&self) -> Decimal {
        (self.monthly_limit - self.current_spend).max(Decimal::ZERO)
    }

    pub fn is_over_limit(&self) -> bool {
        self.current_spend > self.monthly_limit
    }

    /// Spend as a fraction of the limit (1.0 for a zero limit).
    pub fn utilization(&self) -> f64 {
        if self.monthly_limit <= Decimal::ZERO {
            return 1.0;
        }
        (self.current_spend / self.monthly_limit)
            .to_f64()
            .unwrap_or(1.0)
    }
}

/// Opaque reservation handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub String);

impl ReservationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outstanding hold on budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub tenant_id: TenantId,
    pub amount: Decimal,
    /// Period the amount was charged against
    pub period_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of `try_reserve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationGrant {
    pub granted: bool,
    pub reservation_id: Option<ReservationId>,
    pub remaining_after: Decimal,
    /// Set when this reservation pushed spend across the warning ratio
    #[serde(default)]
    pub crossed_warning: bool,
}

impl ReservationGrant {
    pub fn denied(remaining: Decimal) -> Self {
        Self {
            granted: false,
            reservation_id: None,
            remaining_after: remaining,
            crossed_warning: false,
        }
    }
}
