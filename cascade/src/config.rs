//! Tenant and router configuration.
//!
//! Everything here is plain serde data with `Default` impls and a
//! `validate()`; loading from disk and environment overrides live in the
//! service crate.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::types::Scenario;
use crate::escalation::circuit_breaker::CircuitBreakerConfig;
use crate::escalation::cost::CostModel;
use crate::matcher::config::MatcherConfig;
use crate::matcher::tier_two::SimilarityConfig;
use crate::types::{TenantId, Tier};

pub const DEFAULT_FALLBACK_RESPONSE: &str =
    "I'm sorry, I didn't quite get that. Let me connect you with someone who can help.";

/// Error type for configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("duplicate tenant {0}")]
    DuplicateTenant(TenantId),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_unit(field: &str, v: f64) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&v) {
        return Err(invalid(field, format!("{v} is outside [0, 1]")));
    }
    Ok(())
}

/// Per-tenant learning and sharing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningPolicy {
    pub enabled: bool,
    /// Observations needed before tenant-local auto-apply
    pub min_frequency: u32,
    pub observation_window_days: i64,
    /// Mean confidence needed for auto-apply
    pub min_confidence: f64,
    /// Mean confidence below which a pattern is rejected at the frequency threshold
    pub reject_below: f64,
    pub share_with_peer_group: bool,
    pub peer_group: Option<String>,
    pub peer_group_threshold: f64,
    pub peer_group_auto_approve: bool,
    pub share_globally: bool,
    pub global_threshold: f64,
    pub global_min_tenants: usize,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_frequency: 3,
            observation_window_days: 30,
            min_confidence: 0.5,
            reject_below: 0.2,
            share_with_peer_group: false,
            peer_group: None,
            peer_group_threshold: 85.0,
            peer_group_auto_approve: false,
            share_globally: false,
            global_threshold: 90.0,
            global_min_tenants: 3,
        }
    }
}

impl LearningPolicy {
    pub fn observation_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.observation_window_days.max(1))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_frequency == 0 {
            return Err(invalid("learning.min_frequency", "must be at least 1"));
        }
        if self.observation_window_days <= 0 {
            return Err(invalid("learning.observation_window_days", "must be positive"));
        }
        check_unit("learning.min_confidence", self.min_confidence)?;
        check_unit("learning.reject_below", self.reject_below)?;
        if self.reject_below > self.min_confidence {
            return Err(invalid(
                "learning.reject_below",
                "must not exceed learning.min_confidence",
            ));
        }
        for (field, v) in [
            ("learning.peer_group_threshold", self.peer_group_threshold),
            ("learning.global_threshold", self.global_threshold),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(invalid(field, format!("{v} is outside [0, 100]")));
            }
        }
        if self.share_with_peer_group && self.peer_group.as_deref().map_or(true, str::is_empty) {
            return Err(invalid(
                "learning.peer_group",
                "required when share_with_peer_group is set",
            ));
        }
        Ok(())
    }
}

/// Confidence policy, budget and matcher inputs for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub tier1_threshold: f64,
    pub tier2_threshold: f64,
    /// Minimum provider confidence for a Tier 3 match
    pub tier3_threshold: f64,
    pub escalation_enabled: bool,
    pub monthly_budget: Decimal,
    pub fallback_response: String,
    pub matcher: MatcherConfig,
    pub learning: LearningPolicy,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_id: TenantId::default(),
            tier1_threshold: 0.80,
            tier2_threshold: 0.60,
            tier3_threshold: 0.50,
            escalation_enabled: true,
            monthly_budget: Decimal::ONE_HUNDRED,
            fallback_response: DEFAULT_FALLBACK_RESPONSE.to_string(),
            matcher: MatcherConfig::default(),
            learning: LearningPolicy::default(),
        }
    }
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId::new(tenant_id),
            ..Self::default()
        }
    }

    pub fn threshold(&self, tier: Tier) -> f64 {
        match tier {
            Tier::One => self.tier1_threshold,
            Tier::Two => self.tier2_threshold,
            Tier::Three => self.tier3_threshold,
        }
    }

    /// Threshold a match on a scenario must reach: the stricter of the
    /// tenant's tier threshold and the scenario's own minimum.
    pub fn effective_threshold(&self, tier: Tier, scenario_min: Option<f64>) -> f64 {
        let base = self.threshold(tier);
        match scenario_min {
            Some(min) if min > base => min,
            _ => base,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.tenant_id.as_str().trim().is_empty() {
            return Err(invalid("tenant_id", "must not be empty"));
        }
        check_unit("tier1_threshold", self.tier1_threshold)?;
        check_unit("tier2_threshold", self.tier2_threshold)?;
        check_unit("tier3_threshold", self.tier3_threshold)?;
        if self.tier2_threshold >= self.tier1_threshold {
            return Err(invalid(
                "tier2_threshold",
                format!(
                    "{} must be strictly lower than tier1_threshold {}",
                    self.tier2_threshold, self.tier1_threshold
                ),
            ));
        }
        if self.monthly_budget < Decimal::ZERO {
            return Err(invalid("monthly_budget", "must not be negative"));
        }
        if self.fallback_response.trim().is_empty() {
            return Err(invalid("fallback_response", "must not be empty"));
        }
        self.learning.validate()
    }
}

/// Soft time limits per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tier1_ms: u64,
    pub tier2_ms: u64,
    pub tier3_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tier1_ms: 50,
            tier2_ms: 300,
            tier3_ms: 3_000,
        }
    }
}

impl TimeoutConfig {
    pub fn for_tier(&self, tier: Tier) -> Duration {
        Duration::from_millis(match tier {
            Tier::One => self.tier1_ms,
            Tier::Two => self.tier2_ms,
            Tier::Three => self.tier3_ms,
        })
    }
}

/// Process-wide router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub timeouts: TimeoutConfig,
    pub similarity: SimilarityConfig,
    pub pricing: CostModel,
    pub circuit_breaker: CircuitBreakerConfig,
    pub budget_warning_ratio: f64,
    /// Scenarios included in the Tier 3 catalog summary
    pub max_summary_scenarios: usize,
    /// Pending hand-offs before the learning channel applies backpressure
    pub learning_queue_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            similarity: SimilarityConfig::default(),
            pricing: CostModel::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            budget_warning_ratio: 0.8,
            max_summary_scenarios: 50,
            learning_queue_capacity: 1024,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("budget_warning_ratio", self.budget_warning_ratio)?;
        if self.timeouts.tier1_ms == 0 || self.timeouts.tier2_ms == 0 || self.timeouts.tier3_ms == 0 {
            return Err(invalid("timeouts", "every tier timeout must be positive"));
        }
        if self.max_summary_scenarios == 0 {
            return Err(invalid("max_summary_scenarios", "must be at least 1"));
        }
        if self.learning_queue_capacity == 0 {
            return Err(invalid("learning_queue_capacity", "must be at least 1"));
        }
        for (field, price) in [
            ("pricing.base_cost_per_call", self.pricing.base_cost_per_call),
            ("pricing.input_price_per_1k_tokens", self.pricing.input_price_per_1k_tokens),
            ("pricing.output_price_per_1k_tokens", self.pricing.output_price_per_1k_tokens),
        ] {
            if price < Decimal::ZERO {
                return Err(invalid(field, format!("{price} must not be negative")));
            }
        }
        if self.pricing.chars_per_token <= 0.0 {
            return Err(invalid("pricing.chars_per_token", "must be positive"));
        }
        if self.pricing.tokens_per_word <= 0.0 {
            return Err(invalid("pricing.tokens_per_word", "must be positive"));
        }
        Ok(())
    }
}

/// One tenant entry of a tenants file: config plus its starting catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEntry {
    #[serde(flatten)]
    pub config: TenantConfig,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// TOML document describing the router and its tenants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantsFile {
    pub router: RouterConfig,
    pub tenants: Vec<TenantEntry>,
}

impl TenantsFile {
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let file: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.router.validate()?;
        let mut seen = std::collections::HashSet::new();
        for t in &self.tenants {
            t.config.validate()?;
            if !seen.insert(&t.config.tenant_id) {
                return Err(ConfigError::DuplicateTenant(t.config.tenant_id.clone()));
            }
        }
        Ok(())
    }
}

/// Live tenant configs, swappable at runtime.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: RwLock<BTreeMap<TenantId, Arc<TenantConfig>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Validate and insert or replace a tenant config.
    pub fn upsert(&self, config: TenantConfig) -> ConfigResult<()> {
        config.validate()?;
        let mut tenants = self.tenants.write().map_err(|_| ConfigError::LockPoisoned)?;
        info!(tenant = %config.tenant_id, "Tenant config registered");
        tenants.insert(config.tenant_id.clone(), Arc::new(config));
        Ok(())
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<TenantConfig>> {
        self.tenants.read().ok()?.get(tenant).cloned()
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.tenants
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Tenants whose learning policy names `group`.
    pub fn peers(&self, group: &str) -> Vec<TenantId> {
        self.tenants
            .read()
            .map(|t| {
                t.values()
                    .filter(|c| c.learning.peer_group.as_deref() == Some(group))
                    .map(|c| c.tenant_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tenants.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
