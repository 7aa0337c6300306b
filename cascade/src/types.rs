//! Shared routing types: identifiers, tiers, per-tier match results and the
//! final routing decision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque tenant identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable scenario identifier. Never reused after the scenario is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Matching tiers in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Deterministic rule match (free)
    One,
    /// Statistical similarity match (free)
    Two,
    /// Generative fallback (paid)
    Three,
}

impl Tier {
    pub fn number(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Whether running this tier costs money.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Three)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

/// Output of a single tier.
///
/// `signals` holds the per-feature breakdown the confidence was computed
/// from; for tiers one and two the same inputs always produce the same map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub scenario_id: Option<ScenarioId>,
    pub confidence: f64,
    pub tier: Tier,
    pub signals: BTreeMap<String, f64>,
    pub elapsed_ms: f64,
}

impl MatchResult {
    /// A result that matched nothing.
    pub fn no_match(tier: Tier) -> Self {
        Self {
            scenario_id: None,
            confidence: 0.0,
            tier,
            signals: BTreeMap::new(),
            elapsed_ms: 0.0,
        }
    }

    pub fn with_signal(mut self, name: &str, value: f64) -> Self {
        self.signals.insert(name.to_string(), value);
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_match(&self) -> bool {
        self.scenario_id.is_some() && self.confidence > 0.0
    }

    pub fn signal(&self, name: &str) -> f64 {
        self.signals.get(name).copied().unwrap_or(0.0)
    }
}

/// Identifies the turn being routed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub call_id: String,
    pub turn_index: u32,
}

impl CallContext {
    pub fn new(call_id: impl Into<String>, turn_index: u32) -> Self {
        Self {
            call_id: call_id.into(),
            turn_index,
        }
    }
}

/// Why a decision ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// A tier met its threshold
    Matched,
    /// All tiers ran, none met threshold
    NoMatch,
    /// Tier 3 admission was denied by the ledger
    BudgetExhausted,
    /// Tier 3 failed or timed out
    ProviderError,
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::NoMatch => write!(f, "no_match"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::ProviderError => write!(f, "provider_error"),
        }
    }
}

/// Final output of one `route` call. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub call_id: String,
    pub turn_index: u32,
    /// Last tier that ran
    pub tier_used: Tier,
    pub matched: bool,
    pub scenario_id: Option<ScenarioId>,
    pub response_text: String,
    pub confidence: f64,
    /// Zero unless tier 3 was called
    pub cost_incurred: Decimal,
    pub latency_ms: f64,
    pub outcome: DecisionOutcome,
    /// Every tier result in the order the tiers ran
    pub trace: Vec<MatchResult>,
}

impl RoutingDecision {
    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "{} outcome={} scenario={} confidence={:.3} cost={} latency={:.1}ms",
            self.tier_used,
            self.outcome,
            self.scenario_id
                .as_ref()
                .map(|s| s.as_str())
                .unwrap_or("-"),
            self.confidence,
            self.cost_incurred,
            self.latency_ms
        )
    }
}

/// Short, stable digest of an utterance for logs that must not carry raw
/// caller content.
pub fn utterance_digest(utterance: &str) -> String {
    let hash = blake3::hash(utterance.as_bytes());
    hash.to_hex()[..16].to_string()
}
