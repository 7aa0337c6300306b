use serde::{Deserialize, Serialize};

use crate::budget::BudgetError;
use crate::config::ConfigError;
use crate::learning::PatternError;
use crate::types::TenantId;

/// Machine-readable class of a routing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingErrorKind {
    CatalogUnavailable,
    UnknownTenant,
    InvalidConfig,
    LearningUnavailable,
}

impl std::fmt::Display for RoutingErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CatalogUnavailable => write!(f, "catalog_unavailable"),
            Self::UnknownTenant => write!(f, "unknown_tenant"),
            Self::InvalidConfig => write!(f, "invalid_config"),
            Self::LearningUnavailable => write!(f, "learning_unavailable"),
        }
    }
}

/// Conditions `route` surfaces instead of a decision
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("catalog unavailable for tenant {tenant}: {reason}")]
    CatalogUnavailable { tenant: TenantId, reason: String },

    #[error("unknown tenant {0}")]
    UnknownTenant(TenantId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("learning worker unavailable: {0}")]
    LearningUnavailable(String),
}

impl RoutingError {
    pub fn kind(&self) -> RoutingErrorKind {
        match self {
            Self::CatalogUnavailable { .. } => RoutingErrorKind::CatalogUnavailable,
            Self::UnknownTenant(_) => RoutingErrorKind::UnknownTenant,
            Self::InvalidConfig(_) => RoutingErrorKind::InvalidConfig,
            Self::LearningUnavailable(_) => RoutingErrorKind::LearningUnavailable,
        }
    }
}

impl From<ConfigError> for RoutingError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

impl From<BudgetError> for RoutingError {
    fn from(e: BudgetError) -> Self {
        Self::InvalidConfig(format!("budget setup failed: {}", e))
    }
}

impl From<PatternError> for RoutingError {
    fn from(e: PatternError) -> Self {
        Self::LearningUnavailable(e.to_string())
    }
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
