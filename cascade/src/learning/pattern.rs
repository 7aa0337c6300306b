//! Learned pattern records and their lifecycle.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PatternError, PatternResult};
use crate::types::{ScenarioId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Keyword,
    Synonym,
    Filler,
    NegativeKeyword,
    NewScenario,
}

impl PatternKind {
    /// Impact sub-score (0–100) of applying a pattern of this kind.
    pub fn impact(self) -> f64 {
        match self {
            Self::NewScenario => 100.0,
            Self::Keyword => 80.0,
            Self::Synonym => 70.0,
            Self::NegativeKeyword => 60.0,
            Self::Filler => 40.0,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Synonym => write!(f, "synonym"),
            Self::Filler => write!(f, "filler"),
            Self::NegativeKeyword => write!(f, "negative_keyword"),
            Self::NewScenario => write!(f, "new_scenario"),
        }
    }
}

/// Typed payload per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternPayload {
    /// Extra trigger phrase for an existing scenario
    Keyword { scenario_id: ScenarioId, phrase: String },
    /// Variant phrase that means `canonical`
    Synonym { variant: String, canonical: String },
    /// Disfluency to strip
    Filler { word: String },
    /// Phrase that must veto a scenario
    NegativeKeyword { scenario_id: ScenarioId, phrase: String },
    /// A scenario the catalog does not have yet
    NewScenario {
        triggers: Vec<String>,
        reply: String,
        #[serde(default)]
        priority: i32,
    },
}

fn canon(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl PatternPayload {
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::Keyword { .. } => PatternKind::Keyword,
            Self::Synonym { .. } => PatternKind::Synonym,
            Self::Filler { .. } => PatternKind::Filler,
            Self::NegativeKeyword { .. } => PatternKind::NegativeKeyword,
            Self::NewScenario { .. } => PatternKind::NewScenario,
        }
    }

    /// Case- and whitespace-insensitive form used for identity.
    pub fn canonical(&self) -> String {
        match self {
            Self::Keyword { scenario_id, phrase } | Self::NegativeKeyword { scenario_id, phrase } => {
                format!("{}|{}", scenario_id, canon(phrase))
            }
            Self::Synonym { variant, canonical } => {
                format!("{}|{}", canon(variant), canon(canonical))
            }
            Self::Filler { word } => canon(word),
            Self::NewScenario { triggers, .. } => {
                // Identity is the trigger set; the reply may be reworded.
                let set: BTreeSet<String> = triggers.iter().map(|t| canon(t)).collect();
                set.into_iter().collect::<Vec<_>>().join("|")
            }
        }
    }
}

/// Deterministic digest of kind and canonical payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn for_payload(payload: &PatternPayload) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(payload.kind().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(payload.canonical().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far a pattern has been shared. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Tenant,
    PeerGroup,
    Global,
}

impl Scope {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Tenant => Some(Self::PeerGroup),
            Self::PeerGroup => Some(Self::Global),
            Self::Global => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tenant => write!(f, "tenant"),
            Self::PeerGroup => write!(f, "peer_group"),
            Self::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    Proposed,
    Approved,
    Rejected,
}

impl std::fmt::Display for PromotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A pattern as tracked for one source tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: PatternId,
    pub kind: PatternKind,
    pub payload: PatternPayload,
    pub source_tenant_id: TenantId,
    /// Mean observed confidence within the current window
    pub confidence: f64,
    pub quality_score: f64,
    /// Observations within the current window
    pub observed_frequency: u32,
    pub scope: Scope,
    pub promotion_state: PromotionState,
    /// Distinct tenants that produced this pattern
    pub observed_tenants: BTreeSet<TenantId>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl LearnedPattern {
    /// A fresh proposal from its first observation.
    pub fn observe(tenant: TenantId, payload: PatternPayload, confidence: f64) -> Self {
        Self::observe_at(tenant, payload, confidence, Utc::now())
    }

    pub fn observe_at(
        tenant: TenantId,
        payload: PatternPayload,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PatternId::for_payload(&payload),
            kind: payload.kind(),
            payload,
            observed_tenants: BTreeSet::from([tenant.clone()]),
            source_tenant_id: tenant,
            confidence,
            quality_score: 0.0,
            observed_frequency: 1,
            scope: Scope::Tenant,
            promotion_state: PromotionState::Proposed,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Count another observation. When the window since `first_seen` has
    /// elapsed, the frequency and mean restart from this observation.
    pub fn record_observation(&mut self, confidence: f64, now: DateTime<Utc>, window: Duration) {
        if now - self.first_seen > window {
            self.observed_frequency = 1;
            self.confidence = confidence;
            self.first_seen = now;
        } else {
            let n = f64::from(self.observed_frequency);
            self.confidence = (self.confidence * n + confidence) / (n + 1.0);
            self.observed_frequency = self.observed_frequency.saturating_add(1);
        }
        self.last_seen = now;
    }

    pub fn approve(&mut self) -> PatternResult<()> {
        self.transition(PromotionState::Approved)
    }

    pub fn reject(&mut self) -> PatternResult<()> {
        self.transition(PromotionState::Rejected)
    }

    fn transition(&mut self, to: PromotionState) -> PatternResult<()> {
        if self.promotion_state != PromotionState::Proposed {
            return Err(PatternError::InvalidTransition {
                from: self.promotion_state.to_string(),
                to: to.to_string(),
            });
        }
        self.promotion_state = to;
        Ok(())
    }

    /// Widen scope by exactly one stage. Only approved patterns move.
    pub fn promote(&mut self, to: Scope) -> PatternResult<()> {
        if self.promotion_state != PromotionState::Approved || self.scope.next() != Some(to) {
            return Err(PatternError::InvalidTransition {
                from: format!("{}/{}", self.promotion_state, self.scope),
                to: to.to_string(),
            });
        }
        self.scope = to;
        Ok(())
    }
}
