//! Notification payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// How loudly a notification should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Machine-readable cause of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Tier 3 was needed but the monthly budget could not cover it.
    BudgetExhausted,
    /// Spend crossed the tenant's warning ratio.
    BudgetWarning,
    /// The generative provider failed, timed out or was circuit-broken.
    Tier3Error,
    /// A learned pattern was seen for the first time.
    PatternProposed,
    /// A pattern is waiting for manual promotion review.
    PatternReviewRequested,
    /// No tier produced a confident match.
    NoMatch,
}

impl ReasonCode {
    /// Default severity for this reason.
    pub fn severity(self) -> Severity {
        match self {
            Self::BudgetExhausted | Self::Tier3Error => Severity::Critical,
            Self::BudgetWarning | Self::PatternReviewRequested => Severity::Warning,
            Self::PatternProposed | Self::NoMatch => Severity::Info,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::BudgetWarning => write!(f, "budget_warning"),
            Self::Tier3Error => write!(f, "tier3_error"),
            Self::PatternProposed => write!(f, "pattern_proposed"),
            Self::PatternReviewRequested => write!(f, "pattern_review_requested"),
            Self::NoMatch => write!(f, "no_match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub severity: Severity,
    pub reason: ReasonCode,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(tenant_id: TenantId, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            tenant_id,
            severity: reason.severity(),
            reason,
            detail: detail.into(),
            call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ReasonCode::PatternReviewRequested).unwrap();
        assert_eq!(json, "\"pattern_review_requested\"");
        assert_eq!(ReasonCode::Tier3Error.to_string(), "tier3_error");
    }

    #[test]
    fn test_notification_defaults_severity_from_reason() {
        let n = Notification::new(TenantId::from("acme"), ReasonCode::BudgetExhausted, "limit hit");
        assert_eq!(n.severity, Severity::Critical);
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("call_id").is_none());
    }
}
