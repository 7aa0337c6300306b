use crate::types::{ScenarioId, TenantId};

/// Error type for catalog operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable for tenant {tenant}: {reason}")]
    Unavailable { tenant: TenantId, reason: String },

    #[error("tenant {0} has no active scenarios")]
    Empty(TenantId),

    #[error("invalid scenario {id}: {reason}")]
    InvalidScenario { id: ScenarioId, reason: String },

    #[error("scenario id {0} was retired and cannot be reused")]
    RetiredId(ScenarioId),

    #[error("scenario {0} not found")]
    ScenarioNotFound(ScenarioId),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
