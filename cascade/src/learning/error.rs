use crate::catalog::CatalogError;
use crate::types::TenantId;

/// Error type for learning operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown tenant {0}")]
    UnknownTenant(TenantId),

    #[error("unknown review {0}")]
    UnknownReview(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("learning worker stopped")]
    WorkerClosed,
}

/// Result type for learning operations
pub type PatternResult<T> = Result<T, PatternError>;
