use rust_decimal::Decimal;

use crate::types::TenantId;

/// Error type for budget operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum BudgetError {
    #[error("no budget entry for tenant {0}")]
    UnknownTenant(TenantId),

    #[error("unknown or already settled reservation {0}")]
    UnknownReservation(String),

    #[error("invalid amount {0}: must be non-negative")]
    InvalidAmount(Decimal),

    #[error("budget store error: {0}")]
    Store(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for budget operations
pub type BudgetResult<T> = Result<T, BudgetError>;
