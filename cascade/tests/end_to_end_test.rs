//! End-to-end routing scenarios through the public router API.
//!
//! Covers:
//! - Tier 1 resolution at zero cost
//! - Tier 2 resolution after a Tier 1 miss, with stubbed and with real tiers
//! - Budget exhaustion falling back without calling the provider
//! - A Tier 3 proposal that is first recorded, then applied on the third
//!   sighting so the same utterance resolves at Tier 1

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;

use cascade::catalog::{CatalogSnapshot, InMemoryCatalogStore, Scenario};
use cascade::config::{RouterConfig, TenantConfig};
use cascade::escalation::{
    ExtractedPattern, GenerativeProvider, ProviderRequest, ProviderResponse, ProviderResult,
    TokenUsage,
};
use cascade::events::{ReasonCode, RecordingNotifier};
use cascade::learning::{PatternKind, PromotionState, Scope};
use cascade::matcher::{MatcherConfig, SimilarityBooster, UtteranceMatcher};
use cascade::router::RouterOrchestrator;
use cascade::types::{CallContext, DecisionOutcome, MatchResult, ScenarioId, TenantId, Tier};

mock! {
    pub Provider {}

    #[async_trait]
    impl GenerativeProvider for Provider {
        fn name(&self) -> &str;
        async fn complete(&self, request: ProviderRequest) -> ProviderResult<ProviderResponse>;
    }
}

fn acme() -> TenantId {
    TenantId::from("acme")
}

fn catalog() -> Arc<InMemoryCatalogStore> {
    let store = InMemoryCatalogStore::new().shared();
    store
        .load_tenant(
            acme(),
            vec![
                Scenario::new("hold", &["hold"], "Sure, take your time.").with_priority(10),
                Scenario::new("hours", &["opening hours", "when are you open"], "We open at nine."),
            ],
        )
        .unwrap();
    store
}

fn silent_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider.expect_complete().never();
    provider
}

#[tokio::test]
async fn test_exact_trigger_resolves_at_tier_one_for_free() {
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(catalog())
        .provider(Arc::new(silent_provider()))
        .build()
        .await
        .unwrap();
    router.register_tenant(TenantConfig::new("acme")).await.unwrap();

    let d = router
        .route("hold please", &acme(), CallContext::new("call-1", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::One);
    assert!(d.matched);
    assert_eq!(d.scenario_id, Some(ScenarioId::from("hold")));
    assert!(d.confidence >= 0.8, "confidence {}", d.confidence);
    assert_eq!(d.cost_incurred, Decimal::ZERO);
    assert_eq!(d.outcome, DecisionOutcome::Matched);
}

struct FixedTierOne(f64);

impl UtteranceMatcher for FixedTierOne {
    fn match_utterance(&self, _: &str, _: &CatalogSnapshot, _: &MatcherConfig) -> MatchResult {
        let mut r = MatchResult::no_match(Tier::One);
        r.scenario_id = Some(ScenarioId::from("hold"));
        r.confidence = self.0;
        r
    }
}

struct FixedTierTwo(f64);

impl SimilarityBooster for FixedTierTwo {
    fn boost(
        &self,
        _: &str,
        tier_one: &MatchResult,
        _: &CatalogSnapshot,
        _: &MatcherConfig,
    ) -> MatchResult {
        let mut r = tier_one.clone();
        r.tier = Tier::Two;
        r.confidence = self.0;
        r
    }
}

#[tokio::test]
async fn test_tier_one_miss_resolves_at_tier_two() {
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(catalog())
        .provider(Arc::new(silent_provider()))
        .tier_one(Arc::new(FixedTierOne(0.45)))
        .tier_two(Arc::new(FixedTierTwo(0.65)))
        .build()
        .await
        .unwrap();
    router.register_tenant(TenantConfig::new("acme")).await.unwrap();

    let d = router
        .route("can you wait a sec", &acme(), CallContext::new("call-2", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::Two);
    assert!(d.matched);
    assert_eq!(d.confidence, 0.65);
    assert_eq!(d.cost_incurred, Decimal::ZERO);
    assert_eq!(d.trace.len(), 2);
    assert_eq!(d.trace[0].confidence, 0.45);
}

#[tokio::test]
async fn test_exhausted_budget_returns_fallback_without_spending() {
    let notifier = RecordingNotifier::new().shared();
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(catalog())
        .provider(Arc::new(silent_provider()))
        .notifier(notifier.clone())
        .build()
        .await
        .unwrap();
    let mut config = TenantConfig::new("acme");
    config.monthly_budget = Decimal::ONE;
    router.register_tenant(config.clone()).await.unwrap();
    router
        .ledger()
        .store()
        .atomic_adjust(&acme(), Decimal::ONE)
        .await
        .unwrap();

    let d = router
        .route("zebra quantum marmalade", &acme(), CallContext::new("call-3", 0))
        .await
        .unwrap();
    assert!(!d.matched);
    assert_eq!(d.outcome, DecisionOutcome::BudgetExhausted);
    assert_eq!(d.response_text, config.fallback_response);
    assert_eq!(d.cost_incurred, Decimal::ZERO);

    let state = router.ledger().state(&acme()).await.unwrap();
    assert_eq!(state.current_spend, Decimal::ONE);
    assert!(notifier
        .notifications()
        .iter()
        .any(|n| n.reason == ReasonCode::BudgetExhausted));
}

fn parking_proposal() -> ProviderResponse {
    ProviderResponse {
        matched_scenario_id: None,
        confidence: 0.2,
        reply: Some("Parking is behind the building.".into()),
        extracted_patterns: vec![ExtractedPattern {
            kind: PatternKind::NewScenario,
            payload: serde_json::json!({
                "triggers": ["where do i park"],
                "reply": "Parking is behind the building."
            }),
            confidence: 0.9,
        }],
        usage: Some(TokenUsage {
            input_tokens: 400,
            output_tokens: 60,
        }),
    }
}

#[tokio::test]
async fn test_new_scenario_proposal_is_learned_after_three_sightings() {
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider
        .expect_complete()
        .times(3)
        .returning(|_| Ok(parking_proposal()));

    let store = catalog();
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(store.clone())
        .provider(Arc::new(provider))
        .build()
        .await
        .unwrap();
    router.register_tenant(TenantConfig::new("acme")).await.unwrap();
    let version_before = store.snapshot(&acme()).unwrap().version;

    // First sighting: recorded, not applied.
    let d = router
        .route("where do i park", &acme(), CallContext::new("call-4", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::Three);
    assert!(!d.matched);
    assert!(d.cost_incurred > Decimal::ZERO);
    router.flush_learning().await.unwrap();

    let learned = router.learning().patterns_for(&acme()).await;
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].promotion_state, PromotionState::Proposed);
    assert_eq!(learned[0].scope, Scope::Tenant);
    assert_eq!(learned[0].observed_frequency, 1);
    assert_eq!(store.snapshot(&acme()).unwrap().version, version_before);

    // Second and third sightings: applied to the tenant catalog.
    for turn in 1..3 {
        router
            .route("where do i park", &acme(), CallContext::new("call-4", turn))
            .await
            .unwrap();
    }
    router.flush_learning().await.unwrap();
    let learned = router.learning().patterns_for(&acme()).await;
    assert_eq!(learned[0].promotion_state, PromotionState::Approved);
    assert!(store.snapshot(&acme()).unwrap().version > version_before);

    // Now free.
    let d = router
        .route("where do i park", &acme(), CallContext::new("call-5", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::One);
    assert!(d.matched);
    assert_eq!(d.cost_incurred, Decimal::ZERO);
    assert_eq!(d.response_text, "Parking is behind the building.");
}

fn billing_catalog(min_confidence: Option<f64>) -> Arc<InMemoryCatalogStore> {
    let mut billing = Scenario::new("billing", &["billing question"], "Let's look at your bill.");
    if let Some(min) = min_confidence {
        billing = billing.with_min_confidence(min);
    }
    let store = InMemoryCatalogStore::new().shared();
    store
        .load_tenant(
            acme(),
            vec![
                Scenario::new("hold", &["hold"], "Sure, take your time.").with_priority(10),
                billing,
            ],
        )
        .unwrap();
    store
}

fn lenient_tier_two() -> TenantConfig {
    let mut config = TenantConfig::new("acme");
    config.tier2_threshold = 0.5;
    config
}

fn declining_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider
        .expect_complete()
        .times(1)
        .returning(|_| Ok(ProviderResponse::default()));
    provider
}

#[tokio::test]
async fn test_misspelling_falls_through_real_tier_one_to_tier_two() {
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(billing_catalog(None))
        .provider(Arc::new(silent_provider()))
        .build()
        .await
        .unwrap();
    router.register_tenant(lenient_tier_two()).await.unwrap();

    let d = router
        .route("biling question", &acme(), CallContext::new("call-6", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::Two);
    assert_eq!(d.scenario_id, Some(ScenarioId::from("billing")));
    assert_eq!(d.response_text, "Let's look at your bill.");
    assert_eq!(d.cost_incurred, Decimal::ZERO);
    assert_eq!(d.trace.len(), 2);
    assert_eq!(d.trace[0].tier, Tier::One);
    assert!(d.trace[0].confidence < 0.8, "tier one {}", d.trace[0].confidence);
    assert!(d.trace[1].confidence >= 0.5, "tier two {}", d.trace[1].confidence);
}

#[tokio::test]
async fn test_scenario_minimum_overrides_tenant_tier_two_threshold() {
    let router = RouterOrchestrator::builder(RouterConfig::default())
        .catalog_store(billing_catalog(Some(0.99)))
        .provider(Arc::new(declining_provider()))
        .build()
        .await
        .unwrap();
    router.register_tenant(lenient_tier_two()).await.unwrap();

    let d = router
        .route("biling question", &acme(), CallContext::new("call-7", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::Three);
    assert!(!d.matched);
    assert_eq!(d.trace[1].scenario_id, Some(ScenarioId::from("billing")));
    assert!(d.trace[1].confidence < 0.99);
}

#[tokio::test]
async fn test_oversized_catalog_skips_similarity_at_router_level() {
    let mut config = RouterConfig::default();
    config.similarity.max_indexed_scenarios = 1;
    let router = RouterOrchestrator::builder(config)
        .catalog_store(billing_catalog(None))
        .provider(Arc::new(declining_provider()))
        .build()
        .await
        .unwrap();
    router.register_tenant(lenient_tier_two()).await.unwrap();

    let d = router
        .route("biling question", &acme(), CallContext::new("call-8", 0))
        .await
        .unwrap();
    assert_eq!(d.tier_used, Tier::Three);
    assert_eq!(d.trace[1], d.trace[0]);
    assert_eq!(d.trace[1].tier, Tier::One);
}
