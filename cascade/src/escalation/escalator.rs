//! Tier Three: budget-gated generative fallback.
//!
//! Admission order is fixed: enabled flag, provider circuit, budget
//! reservation. Only then is the provider called, once, under the tier-3
//! timeout. Every reservation ends in exactly one commit or release.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::cost::CostModel;
use super::provider::{
    ExtractedPattern, GenerativeProvider, ProviderError, ProviderErrorKind, ProviderRequest,
    ProviderResponse, ScenarioSummary,
};
use crate::budget::BudgetLedger;
use crate::catalog::CatalogSnapshot;
use crate::config::TenantConfig;
use crate::types::{utterance_digest, MatchResult, Tier};

/// Triggers per scenario in the catalog summary.
pub const SUMMARY_TRIGGERS: usize = 3;
/// Characters of quick reply per scenario in the catalog summary.
pub const SUMMARY_REPLY_CHARS: usize = 120;

pub const SIGNAL_PROVIDER: &str = "provider";

/// Everything one escalation needs, owned so it can outlive the caller.
#[derive(Debug, Clone)]
pub struct EscalationRequest {
    pub utterance: String,
    pub snapshot: Arc<CatalogSnapshot>,
    pub tenant: Arc<TenantConfig>,
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Tenant has escalation turned off
    Disabled,
    /// Reservation denied
    BudgetExhausted { remaining: Decimal },
    /// Call failed, timed out or was skipped by the circuit breaker
    ProviderError { kind: ProviderErrorKind, message: String },
    Completed {
        /// Tier-three result; `scenario_id` is `None` when the answer was
        /// rejected or below threshold
        match_result: MatchResult,
        patterns: Vec<ExtractedPattern>,
        cost: Decimal,
        /// This call's reservation pushed spend past the warning ratio
        crossed_warning: bool,
    },
}

/// Builds catalog summaries, reserves budget and calls the provider.
pub struct TierThreeEscalator {
    provider: Arc<dyn GenerativeProvider>,
    ledger: Arc<BudgetLedger>,
    breaker: Mutex<CircuitBreaker>,
    pricing: CostModel,
    timeout: Duration,
    max_summary_scenarios: usize,
}

impl TierThreeEscalator {
    pub fn new(provider: Arc<dyn GenerativeProvider>, ledger: Arc<BudgetLedger>) -> Self {
        Self {
            provider,
            ledger,
            breaker: Mutex::new(CircuitBreaker::from_config(CircuitBreakerConfig::default())),
            pricing: CostModel::default(),
            timeout: Duration::from_millis(3000),
            max_summary_scenarios: 50,
        }
    }

    pub fn with_pricing(mut self, pricing: CostModel) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Mutex::new(CircuitBreaker::from_config(config));
        self
    }

    pub fn with_max_summary_scenarios(mut self, max: usize) -> Self {
        self.max_summary_scenarios = max.max(1);
        self
    }

    /// Create a shared reference to this escalator
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn circuit_available(&self) -> bool {
        self.breaker
            .lock()
            .map(|b| b.is_available(self.provider.name()))
            .unwrap_or(true)
    }

    /// Compact view of the catalog sent with each request.
    pub fn summarize(&self, snapshot: &CatalogSnapshot) -> Vec<ScenarioSummary> {
        snapshot
            .scenarios
            .iter()
            .take(self.max_summary_scenarios)
            .map(|s| ScenarioSummary {
                id: s.id.clone(),
                triggers: s
                    .trigger_phrases
                    .iter()
                    .take(SUMMARY_TRIGGERS)
                    .cloned()
                    .collect(),
                reply: s.quick_reply.chars().take(SUMMARY_REPLY_CHARS).collect(),
            })
            .collect()
    }

    pub async fn escalate(&self, request: EscalationRequest) -> EscalationOutcome {
        let tenant_id = request.tenant.tenant_id.clone();
        let digest = utterance_digest(&request.utterance);

        if !request.tenant.escalation_enabled {
            debug!(tenant = %tenant_id, "Tier 3 disabled for tenant");
            return EscalationOutcome::Disabled;
        }

        let provider_name = self.provider.name().to_string();
        if !self.circuit_available() {
            warn!(tenant = %tenant_id, provider = %provider_name, utterance = %digest, "Provider circuit open; skipping tier 3");
            let err = ProviderError::CircuitOpen(provider_name);
            return EscalationOutcome::ProviderError {
                kind: err.kind(),
                message: err.to_string(),
            };
        }

        let summary = self.summarize(&request.snapshot);
        let summary_text = serde_json::to_string(&summary).unwrap_or_default();
        let estimate = self.pricing.estimate(&request.utterance, &summary_text);

        let grant = match self.ledger.try_reserve(&tenant_id, estimate).await {
            Ok(grant) => grant,
            Err(e) => {
                // Ledger failures deny admission rather than risk unaccounted spend.
                warn!(tenant = %tenant_id, error = %e, "Budget reservation failed");
                return EscalationOutcome::BudgetExhausted {
                    remaining: Decimal::ZERO,
                };
            }
        };
        let reservation_id = match (grant.granted, grant.reservation_id) {
            (true, Some(id)) => id,
            _ => {
                info!(tenant = %tenant_id, estimate = %estimate, remaining = %grant.remaining_after, "Tier 3 denied by budget");
                return EscalationOutcome::BudgetExhausted {
                    remaining: grant.remaining_after,
                };
            }
        };

        let provider_request = ProviderRequest {
            tenant_id: tenant_id.clone(),
            utterance: request.utterance.clone(),
            scenario_catalog_summary: summary,
        };
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.provider.complete(provider_request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                self.record_success();
                let actual = response
                    .usage
                    .as_ref()
                    .map(|u| self.pricing.actual(u))
                    .unwrap_or(estimate);
                let cost = match self.ledger.commit(&tenant_id, &reservation_id, actual).await {
                    Ok(charged) => charged,
                    Err(e) => {
                        warn!(tenant = %tenant_id, reservation = %reservation_id, error = %e, "Commit failed; reservation stays charged");
                        estimate
                    }
                };
                let match_result = accept(&response, &request).with_elapsed_ms(elapsed_ms);
                info!(
                    tenant = %tenant_id,
                    call_id = %request.call_id,
                    utterance = %digest,
                    matched = match_result.is_match(),
                    confidence = match_result.confidence,
                    cost = %cost,
                    patterns = response.extracted_patterns.len(),
                    "Tier 3 completed"
                );
                EscalationOutcome::Completed {
                    match_result,
                    patterns: response.extracted_patterns,
                    cost,
                    crossed_warning: grant.crossed_warning,
                }
            }
            Err(err) => {
                self.record_failure();
                if let Err(e) = self.ledger.release(&tenant_id, &reservation_id).await {
                    warn!(tenant = %tenant_id, reservation = %reservation_id, error = %e, "Release failed");
                }
                warn!(
                    tenant = %tenant_id,
                    call_id = %request.call_id,
                    utterance = %digest,
                    error_class = %err.kind(),
                    error = %err,
                    "Tier 3 provider error"
                );
                EscalationOutcome::ProviderError {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        }
    }

    fn record_success(&self) {
        if let Ok(mut breaker) = self.breaker.lock() {
            breaker.record_success(self.provider.name());
        }
    }

    fn record_failure(&self) {
        if let Ok(mut breaker) = self.breaker.lock() {
            breaker.record_failure(self.provider.name());
        }
    }
}

/// Keep the provider's answer only when it names a scenario in this snapshot
/// and clears the tier-three threshold for it.
fn accept(response: &ProviderResponse, request: &EscalationRequest) -> MatchResult {
    let confidence = if response.confidence.is_finite() {
        response.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut result = MatchResult::no_match(Tier::Three).with_signal(SIGNAL_PROVIDER, confidence);
    result.confidence = confidence;

    let Some(id) = response.matched_scenario_id.as_ref() else {
        return result;
    };
    let Some(scenario) = request.snapshot.get(id) else {
        debug!(tenant = %request.tenant.tenant_id, scenario = %id, "Provider named an unknown scenario");
        return result;
    };
    let threshold = request
        .tenant
        .effective_threshold(Tier::Three, scenario.min_confidence);
    if confidence >= threshold {
        result.scenario_id = Some(id.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetState, InMemoryBudgetStore};
    use crate::budget::types::month_start;
    use crate::catalog::Scenario;
    use crate::escalation::provider::{ProviderResult, TokenUsage};
    use crate::types::{ScenarioId, TenantId};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        response: ProviderResult<ProviderResponse>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn ok(response: ProviderResponse) -> Self {
            Self {
                response: Ok(response),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(ProviderError::Status {
                    status: 503,
                    body: "overloaded".into(),
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, _request: ProviderRequest) -> ProviderResult<ProviderResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone()
        }
    }

    async fn ledger_with(limit: Decimal, spent: Decimal) -> Arc<BudgetLedger> {
        let store = InMemoryBudgetStore::new().shared();
        let mut state = BudgetState::new(limit, month_start(Utc::now()));
        state.current_spend = spent;
        store.insert_state(TenantId::from("acme"), state).unwrap();
        BudgetLedger::new(store).shared()
    }

    fn request() -> EscalationRequest {
        let snapshot = CatalogSnapshot::new(
            TenantId::from("acme"),
            vec![
                Scenario::new("hours", &["opening hours", "when are you open", "hours", "schedule"], "We open at nine."),
                Scenario::new("strict", &["refund"], "Refunds take a week.").with_min_confidence(0.9),
            ],
        );
        EscalationRequest {
            utterance: "what time do you close".into(),
            snapshot: Arc::new(snapshot),
            tenant: Arc::new(TenantConfig::new("acme")),
            call_id: "call-1".into(),
        }
    }

    fn answer(scenario: Option<&str>, confidence: f64) -> ProviderResponse {
        ProviderResponse {
            matched_scenario_id: scenario.map(ScenarioId::from),
            confidence,
            reply: None,
            extracted_patterns: Vec::new(),
            usage: Some(TokenUsage {
                input_tokens: 1000,
                output_tokens: 100,
            }),
        }
    }

    #[tokio::test]
    async fn test_completed_match_commits_actual_cost() {
        let ledger = ledger_with(Decimal::TEN, Decimal::ZERO).await;
        let esc = TierThreeEscalator::new(Arc::new(FakeProvider::ok(answer(Some("hours"), 0.9))), ledger.clone());
        match esc.escalate(request()).await {
            EscalationOutcome::Completed { match_result, cost, .. } => {
                assert_eq!(match_result.scenario_id, Some(ScenarioId::from("hours")));
                assert_eq!(match_result.tier, Tier::Three);
                // 0.001 + 1000 * 0.003 / 1000 + 100 * 0.015 / 1000
                assert_eq!(cost, Decimal::new(55, 4));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let state = ledger.state(&TenantId::from("acme")).await.unwrap();
        assert_eq!(state.current_spend, Decimal::new(55, 4));
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_weak_answers_are_not_matches() {
        for (scenario, confidence) in [(Some("nope"), 0.99), (Some("hours"), 0.3), (Some("strict"), 0.85)] {
            let ledger = ledger_with(Decimal::TEN, Decimal::ZERO).await;
            let esc = TierThreeEscalator::new(Arc::new(FakeProvider::ok(answer(scenario, confidence))), ledger);
            match esc.escalate(request()).await {
                EscalationOutcome::Completed { match_result, cost, .. } => {
                    assert!(!match_result.is_match(), "{:?} {}", scenario, confidence);
                    assert!(cost > Decimal::ZERO);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_provider() {
        let ledger = ledger_with(Decimal::TEN, Decimal::TEN).await;
        let provider = Arc::new(FakeProvider::ok(answer(Some("hours"), 0.9)));
        let esc = TierThreeEscalator::new(provider.clone(), ledger.clone());
        assert!(matches!(
            esc.escalate(request()).await,
            EscalationOutcome::BudgetExhausted { .. }
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        let state = ledger.state(&TenantId::from("acme")).await.unwrap();
        assert_eq!(state.current_spend, Decimal::TEN);
    }

    #[tokio::test]
    async fn test_disabled_tenant_never_reserves() {
        let ledger = ledger_with(Decimal::TEN, Decimal::ZERO).await;
        let esc = TierThreeEscalator::new(Arc::new(FakeProvider::ok(answer(None, 0.0))), ledger.clone());
        let mut req = request();
        let mut cfg = TenantConfig::new("acme");
        cfg.escalation_enabled = false;
        req.tenant = Arc::new(cfg);
        assert_eq!(esc.escalate(req).await, EscalationOutcome::Disabled);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_releases_and_opens_circuit() {
        let ledger = ledger_with(Decimal::TEN, Decimal::ZERO).await;
        let provider = Arc::new(FakeProvider::failing());
        let esc = TierThreeEscalator::new(provider.clone(), ledger.clone()).with_circuit_breaker(
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown_secs: 3600,
            },
        );
        for _ in 0..2 {
            match esc.escalate(request()).await {
                EscalationOutcome::ProviderError { kind, .. } => assert_eq!(kind, ProviderErrorKind::Status),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        let state = ledger.state(&TenantId::from("acme")).await.unwrap();
        assert_eq!(state.current_spend, Decimal::ZERO);

        match esc.escalate(request()).await {
            EscalationOutcome::ProviderError { kind, .. } => assert_eq!(kind, ProviderErrorKind::CircuitOpen),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_provider_error() {
        let ledger = ledger_with(Decimal::TEN, Decimal::ZERO).await;
        let mut provider = FakeProvider::ok(answer(Some("hours"), 0.9));
        provider.delay = Duration::from_secs(10);
        let esc = TierThreeEscalator::new(Arc::new(provider), ledger.clone())
            .with_timeout(Duration::from_millis(100));
        match esc.escalate(request()).await {
            EscalationOutcome::ProviderError { kind, .. } => assert_eq!(kind, ProviderErrorKind::Timeout),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn test_summary_is_capped() {
        let ledger_store = InMemoryBudgetStore::new().shared();
        let esc = TierThreeEscalator::new(
            Arc::new(FakeProvider::failing()),
            BudgetLedger::new(ledger_store).shared(),
        )
        .with_max_summary_scenarios(1);
        let mut req = request();
        let long = "x".repeat(500);
        let snap = CatalogSnapshot::new(
            TenantId::from("acme"),
            vec![
                Scenario::new("a", &["one", "two", "three", "four"], &long),
                Scenario::new("b", &["b"], "b"),
            ],
        );
        req.snapshot = Arc::new(snap);
        let summary = esc.summarize(&req.snapshot);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].triggers.len(), SUMMARY_TRIGGERS);
        assert_eq!(summary[0].reply.chars().count(), SUMMARY_REPLY_CHARS);
    }
}
