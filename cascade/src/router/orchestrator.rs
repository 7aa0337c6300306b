//! Router orchestrator - the single entry point for one utterance.
//!
//! Runs the tiers strictly in order and stops at the first one whose result
//! clears the tenant's threshold:
//!
//! ```text
//! tier 1 (spawn_blocking, soft timeout) ──ok──► decision
//!    │ below threshold
//! tier 2 (spawn_blocking, soft timeout) ──ok──► decision
//!    │ below threshold
//! tier 3 (spawned task: reserve → call → commit/release → learning hand-off)
//!    └──────────────────────────────────────────► decision
//! ```

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::error::{RoutingError, RoutingResult};
use crate::budget::{BudgetLedger, BudgetStore, InMemoryBudgetStore};
use crate::catalog::{CatalogSnapshot, CatalogStore, ScenarioCatalog, SharedScenarioCatalog};
use crate::config::{RouterConfig, TenantConfig, TenantRegistry, TimeoutConfig};
use crate::escalation::{EscalationOutcome, EscalationRequest, GenerativeProvider, TierThreeEscalator};
use crate::events::{Notification, Notifier, ReasonCode, TracingNotifier};
use crate::learning::{LearningHandle, PatternLearningPipeline};
use crate::matcher::{
    PreparedCache, SimilarityBooster, TierOneMatcher, TierTwoBooster, UtteranceMatcher,
};
use crate::types::{
    utterance_digest, CallContext, DecisionOutcome, MatchResult, RoutingDecision, ScenarioId,
    TenantId, Tier,
};

/// Signal recorded on a tier that hit its soft timeout.
pub const SIGNAL_TIMEOUT: &str = "timeout";
/// Signal recorded on a tier whose worker panicked.
pub const SIGNAL_ERROR: &str = "error";

/// Shared reference to RouterOrchestrator
pub type SharedRouter = Arc<RouterOrchestrator>;

/// Collects collaborators for a [`RouterOrchestrator`].
pub struct RouterBuilder {
    config: RouterConfig,
    catalog_store: Option<Arc<dyn CatalogStore>>,
    budget_store: Option<Arc<dyn BudgetStore>>,
    provider: Option<Arc<dyn GenerativeProvider>>,
    notifier: Arc<dyn Notifier>,
    tier_one: Option<Arc<dyn UtteranceMatcher>>,
    tier_two: Option<Arc<dyn SimilarityBooster>>,
    tenants: Arc<TenantRegistry>,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            catalog_store: None,
            budget_store: None,
            provider: None,
            notifier: Arc::new(TracingNotifier),
            tier_one: None,
            tier_two: None,
            tenants: TenantRegistry::new().shared(),
        }
    }

    pub fn catalog_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.catalog_store = Some(store);
        self
    }

    /// Defaults to an in-memory store.
    pub fn budget_store(mut self, store: Arc<dyn BudgetStore>) -> Self {
        self.budget_store = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn GenerativeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the rule matcher.
    pub fn tier_one(mut self, matcher: Arc<dyn UtteranceMatcher>) -> Self {
        self.tier_one = Some(matcher);
        self
    }

    /// Replace the similarity booster.
    pub fn tier_two(mut self, booster: Arc<dyn SimilarityBooster>) -> Self {
        self.tier_two = Some(booster);
        self
    }

    pub fn tenants(mut self, tenants: Arc<TenantRegistry>) -> Self {
        self.tenants = tenants;
        self
    }

    /// Wire everything together and start the learning worker. Must be
    /// called inside a tokio runtime.
    pub async fn build(self) -> RoutingResult<RouterOrchestrator> {
        self.config.validate()?;
        let catalog_store = self
            .catalog_store
            .ok_or_else(|| RoutingError::InvalidConfig("catalog store is required".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| RoutingError::InvalidConfig("generative provider is required".into()))?;
        let budget_store: Arc<dyn BudgetStore> = match self.budget_store {
            Some(store) => store,
            None => InMemoryBudgetStore::new().shared(),
        };

        let catalog = ScenarioCatalog::new(catalog_store).shared();
        let ledger = BudgetLedger::new(budget_store)
            .with_warning_ratio(self.config.budget_warning_ratio)
            .shared();
        let escalator = TierThreeEscalator::new(provider, Arc::clone(&ledger))
            .with_pricing(self.config.pricing.clone())
            .with_timeout(self.config.timeouts.for_tier(Tier::Three))
            .with_circuit_breaker(self.config.circuit_breaker)
            .with_max_summary_scenarios(self.config.max_summary_scenarios)
            .shared();
        let pipeline = PatternLearningPipeline::new(
            Arc::clone(&catalog),
            Arc::clone(&self.tenants),
            Arc::clone(&self.notifier),
        )
        .shared();
        let (learning, _worker) =
            LearningHandle::spawn(Arc::clone(&pipeline), self.config.learning_queue_capacity);

        for tenant in self.tenants.tenant_ids() {
            if let Some(cfg) = self.tenants.get(&tenant) {
                ledger.ensure_tenant(&tenant, cfg.monthly_budget).await?;
            }
        }

        let prepared = PreparedCache::new().shared();
        let tier_one: Arc<dyn UtteranceMatcher> = match self.tier_one {
            Some(matcher) => matcher,
            None => TierOneMatcher::with_cache(Arc::clone(&prepared)).shared(),
        };
        let tier_two: Arc<dyn SimilarityBooster> = match self.tier_two {
            Some(booster) => booster,
            None => TierTwoBooster::with_cache(self.config.similarity.clone(), prepared).shared(),
        };

        info!(
            tenants = self.tenants.len(),
            provider = escalator.provider_name(),
            "Router ready"
        );

        Ok(RouterOrchestrator {
            tenants: self.tenants,
            catalog,
            tier_one,
            tier_two,
            escalator,
            ledger,
            pipeline,
            learning,
            notifier: self.notifier,
            timeouts: self.config.timeouts,
        })
    }
}

/// Runs the cascade for one utterance and returns exactly one decision.
pub struct RouterOrchestrator {
    tenants: Arc<TenantRegistry>,
    catalog: SharedScenarioCatalog,
    tier_one: Arc<dyn UtteranceMatcher>,
    tier_two: Arc<dyn SimilarityBooster>,
    escalator: Arc<TierThreeEscalator>,
    ledger: Arc<BudgetLedger>,
    pipeline: Arc<PatternLearningPipeline>,
    learning: LearningHandle,
    notifier: Arc<dyn Notifier>,
    timeouts: TimeoutConfig,
}

impl RouterOrchestrator {
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// Create a shared reference to this router
    pub fn shared(self) -> SharedRouter {
        Arc::new(self)
    }

    /// Add or replace a tenant's config and open its budget entry.
    pub async fn register_tenant(&self, config: TenantConfig) -> RoutingResult<()> {
        let tenant = config.tenant_id.clone();
        let limit = config.monthly_budget;
        self.tenants.upsert(config)?;
        self.ledger.ensure_tenant(&tenant, limit).await?;
        self.catalog.invalidate(&tenant);
        Ok(())
    }

    pub fn tenants(&self) -> &Arc<TenantRegistry> {
        &self.tenants
    }

    pub fn catalog(&self) -> &SharedScenarioCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    pub fn learning(&self) -> &Arc<PatternLearningPipeline> {
        &self.pipeline
    }

    /// Wait until every pattern handed off so far has been processed.
    pub async fn flush_learning(&self) -> RoutingResult<()> {
        self.learning.flush().await?;
        Ok(())
    }

    /// Route one utterance.
    ///
    /// Only an unknown tenant or an unusable catalog is an error; every
    /// other condition degrades to the tenant's fallback response.
    pub async fn route(
        &self,
        utterance: &str,
        tenant_id: &TenantId,
        context: CallContext,
    ) -> RoutingResult<RoutingDecision> {
        let started = Instant::now();
        let digest = utterance_digest(utterance);

        let config = self
            .tenants
            .get(tenant_id)
            .ok_or_else(|| RoutingError::UnknownTenant(tenant_id.clone()))?;
        let snapshot = self.catalog.snapshot(tenant_id).await.map_err(|e| {
            warn!(tenant = %tenant_id, call_id = %context.call_id, error = %e, "Catalog unavailable");
            RoutingError::CatalogUnavailable {
                tenant: tenant_id.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(tenant = %tenant_id, call_id = %context.call_id, utterance, "Routing utterance");

        let mut trace = Vec::with_capacity(3);

        // Tier 1
        let tier_one = {
            let matcher = Arc::clone(&self.tier_one);
            let text = utterance.to_string();
            let snap = Arc::clone(&snapshot);
            let cfg = Arc::clone(&config);
            self.run_tier(Tier::One, tenant_id, move || {
                matcher.match_utterance(&text, &snap, &cfg.matcher)
            })
            .await
        };
        trace.push(tier_one.clone());
        if let Some(id) = accepted(&tier_one, Tier::One, &snapshot, &config) {
            return Ok(self.finish(Decision::matched(Tier::One, id, &tier_one), &snapshot, &config, context, trace, started, &digest));
        }

        // Tier 2
        let tier_two = {
            let booster = Arc::clone(&self.tier_two);
            let text = utterance.to_string();
            let snap = Arc::clone(&snapshot);
            let cfg = Arc::clone(&config);
            let prior = tier_one.clone();
            self.run_tier(Tier::Two, tenant_id, move || {
                booster.boost(&text, &prior, &snap, &cfg.matcher)
            })
            .await
        };
        trace.push(tier_two.clone());
        if let Some(id) = accepted(&tier_two, Tier::Two, &snapshot, &config) {
            return Ok(self.finish(Decision::matched(Tier::Two, id, &tier_two), &snapshot, &config, context, trace, started, &digest));
        }

        // Tier 3
        let outcome = self
            .escalate(EscalationRequest {
                utterance: utterance.to_string(),
                snapshot: Arc::clone(&snapshot),
                tenant: Arc::clone(&config),
                call_id: context.call_id.clone(),
            })
            .await;

        let decision = match outcome {
            EscalationOutcome::Disabled => {
                self.notify(tenant_id, &context, ReasonCode::NoMatch, "no tier met its threshold; tier 3 disabled");
                Decision::unmatched(Tier::Two, DecisionOutcome::NoMatch, best_confidence(&trace))
            }
            EscalationOutcome::BudgetExhausted { remaining } => {
                self.notify(
                    tenant_id,
                    &context,
                    ReasonCode::BudgetExhausted,
                    format!("tier 3 reservation denied; remaining {}", remaining),
                );
                Decision::unmatched(Tier::Three, DecisionOutcome::BudgetExhausted, best_confidence(&trace))
            }
            EscalationOutcome::ProviderError { kind, message } => {
                self.notify(
                    tenant_id,
                    &context,
                    ReasonCode::Tier3Error,
                    format!("{}: {}", kind, message),
                );
                Decision::unmatched(Tier::Three, DecisionOutcome::ProviderError, best_confidence(&trace))
            }
            EscalationOutcome::Completed { match_result, cost, .. } => {
                trace.push(match_result.clone());
                match match_result.scenario_id.clone() {
                    Some(id) => Decision::matched(Tier::Three, id, &match_result).with_cost(cost),
                    None => {
                        self.notify(tenant_id, &context, ReasonCode::NoMatch, "no tier met its threshold");
                        Decision::unmatched(Tier::Three, DecisionOutcome::NoMatch, match_result.confidence)
                            .with_cost(cost)
                    }
                }
            }
        };

        Ok(self.finish(decision, &snapshot, &config, context, trace, started, &digest))
    }

    /// Run a pure tier on the blocking pool under its soft timeout.
    async fn run_tier<F>(&self, tier: Tier, tenant_id: &TenantId, f: F) -> MatchResult
    where
        F: FnOnce() -> MatchResult + Send + 'static,
    {
        let limit = self.timeouts.for_tier(tier);
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tenant = %tenant_id, tier = %tier, error = %e, "Tier worker failed");
                MatchResult::no_match(tier).with_signal(SIGNAL_ERROR, 1.0)
            }
            Err(_) => {
                warn!(tenant = %tenant_id, tier = %tier, limit_ms = limit.as_millis() as u64, "Tier timed out");
                MatchResult::no_match(tier)
                    .with_signal(SIGNAL_TIMEOUT, 1.0)
                    .with_elapsed_ms(limit.as_secs_f64() * 1000.0)
            }
        }
    }

    /// Tier 3 in its own task so cost accounting and learning finish even if
    /// the caller goes away.
    async fn escalate(&self, request: EscalationRequest) -> EscalationOutcome {
        let escalator = Arc::clone(&self.escalator);
        let learning = self.learning.clone();
        let notifier = Arc::clone(&self.notifier);
        let tenant_id = request.tenant.tenant_id.clone();
        let call_id = request.call_id.clone();

        let task = tokio::spawn(async move {
            let outcome = escalator.escalate(request).await;
            if let EscalationOutcome::Completed {
                patterns,
                crossed_warning,
                ..
            } = &outcome
            {
                if *crossed_warning {
                    notifier.notify(
                        Notification::new(
                            tenant_id.clone(),
                            ReasonCode::BudgetWarning,
                            "monthly spend crossed the warning threshold",
                        )
                        .with_call_id(call_id.clone()),
                    );
                }
                if !patterns.is_empty() {
                    learning.submit(tenant_id.clone(), patterns.clone());
                }
            }
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Tier 3 task failed");
                EscalationOutcome::ProviderError {
                    kind: crate::escalation::ProviderErrorKind::Transport,
                    message: e.to_string(),
                }
            }
        }
    }

    fn notify(&self, tenant_id: &TenantId, context: &CallContext, reason: ReasonCode, detail: impl Into<String>) {
        self.notifier.notify(
            Notification::new(tenant_id.clone(), reason, detail).with_call_id(context.call_id.clone()),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        decision: Decision,
        snapshot: &CatalogSnapshot,
        config: &TenantConfig,
        context: CallContext,
        trace: Vec<MatchResult>,
        started: Instant,
        digest: &str,
    ) -> RoutingDecision {
        let response_text = decision
            .scenario_id
            .as_ref()
            .and_then(|id| snapshot.get(id))
            .map(|s| s.reply().to_string())
            .unwrap_or_else(|| config.fallback_response.clone());
        let routed = RoutingDecision {
            call_id: context.call_id,
            turn_index: context.turn_index,
            tier_used: decision.tier,
            matched: decision.scenario_id.is_some(),
            scenario_id: decision.scenario_id,
            response_text,
            confidence: decision.confidence,
            cost_incurred: decision.cost,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            outcome: decision.outcome,
            trace,
        };
        info!(
            tenant = %config.tenant_id,
            call_id = %routed.call_id,
            turn = routed.turn_index,
            utterance = %digest,
            "{}",
            routed.summary()
        );
        routed
    }
}

/// Intermediate result before the response text is resolved.
struct Decision {
    tier: Tier,
    scenario_id: Option<ScenarioId>,
    confidence: f64,
    cost: Decimal,
    outcome: DecisionOutcome,
}

impl Decision {
    fn matched(tier: Tier, id: ScenarioId, result: &MatchResult) -> Self {
        Self {
            tier,
            scenario_id: Some(id),
            confidence: result.confidence,
            cost: Decimal::ZERO,
            outcome: DecisionOutcome::Matched,
        }
    }

    fn unmatched(tier: Tier, outcome: DecisionOutcome, confidence: f64) -> Self {
        Self {
            tier,
            scenario_id: None,
            confidence,
            cost: Decimal::ZERO,
            outcome,
        }
    }

    fn with_cost(mut self, cost: Decimal) -> Self {
        self.cost = cost;
        self
    }
}

/// Scenario id when `result` clears the stricter of the tenant threshold and
/// the scenario's own minimum.
fn accepted(
    result: &MatchResult,
    tier: Tier,
    snapshot: &CatalogSnapshot,
    config: &TenantConfig,
) -> Option<ScenarioId> {
    let id = result.scenario_id.as_ref()?;
    let scenario = snapshot.get(id)?;
    let threshold = config.effective_threshold(tier, scenario.min_confidence);
    (result.confidence >= threshold).then(|| id.clone())
}

fn best_confidence(trace: &[MatchResult]) -> f64 {
    trace.iter().map(|r| r.confidence).fold(0.0, f64::max)
}
