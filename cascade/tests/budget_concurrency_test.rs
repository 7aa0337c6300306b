//! Budget safety under contention.
//!
//! Many tasks on a multi-threaded runtime reserve and commit against one
//! tenant. Whatever the interleaving, the committed total never exceeds the
//! monthly limit and every reservation is settled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use cascade::budget::{month_start, BudgetLedger, BudgetState, BudgetStore, InMemoryBudgetStore};
use cascade::catalog::{CatalogSnapshot, Scenario};
use cascade::config::TenantConfig;
use cascade::escalation::{
    EscalationOutcome, EscalationRequest, GenerativeProvider, ProviderRequest, ProviderResponse,
    ProviderResult, TierThreeEscalator, TokenUsage,
};
use cascade::types::TenantId;

fn tenant() -> TenantId {
    TenantId::from("acme")
}

async fn ledger(limit: Decimal) -> Arc<BudgetLedger> {
    let ledger = BudgetLedger::new(InMemoryBudgetStore::new().shared()).shared();
    ledger.ensure_tenant(&tenant(), limit).await.unwrap();
    ledger
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reserve_commit_never_overspends() {
    let limit = Decimal::from(10);
    let ledger = ledger(limit).await;

    let mut handles = Vec::new();
    for i in 0..200u32 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let amount = Decimal::new(25 + i64::from(i % 50), 2);
            let grant = ledger.try_reserve(&tenant(), amount).await.unwrap();
            let Some(id) = grant.reservation_id else {
                return Decimal::ZERO;
            };
            tokio::task::yield_now().await;
            if i % 7 == 0 {
                ledger.release(&tenant(), &id).await.unwrap();
                Decimal::ZERO
            } else {
                // Actual sometimes exceeds the reservation.
                let actual = if i % 3 == 0 { amount * Decimal::TWO } else { amount };
                ledger.commit(&tenant(), &id, actual).await.unwrap()
            }
        }));
    }

    let committed: Decimal = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();

    let state = ledger.state(&tenant()).await.unwrap();
    assert!(committed <= limit, "committed {} > limit {}", committed, limit);
    assert_eq!(state.current_spend, committed);
    assert_eq!(ledger.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_holds_settled_after_rollover_never_overspend_new_period() {
    let limit = Decimal::from(10);
    let store = InMemoryBudgetStore::new().shared();
    let march = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    store
        .insert_state(tenant(), BudgetState::new(limit, march))
        .unwrap();
    let ledger = BudgetLedger::new(store.clone()).shared();

    // Holds taken at the end of March, still open when April starts.
    let late_march = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
    let mut march_holds = Vec::new();
    for _ in 0..10 {
        let grant = ledger
            .try_reserve_at(&tenant(), Decimal::ONE, late_march)
            .await
            .unwrap();
        march_holds.push(grant.reservation_id.unwrap());
    }

    let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 1).unwrap();
    store
        .reset_period(&tenant(), month_start(april))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let amount = Decimal::new(40 + i64::from(i % 20), 2);
            let grant = ledger.try_reserve_at(&tenant(), amount, april).await.unwrap();
            match grant.reservation_id {
                Some(id) => ledger.commit(&tenant(), &id, amount).await.unwrap(),
                None => Decimal::ZERO,
            }
        }));
    }
    for id in march_holds {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            ledger.commit(&tenant(), &id, Decimal::ONE).await.unwrap()
        }));
    }

    let committed: Decimal = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();

    let state = store.read_budget_state(&tenant()).await.unwrap();
    assert_eq!(state.period_start, month_start(april));
    assert!(state.current_spend <= limit, "spend {} > limit {}", state.current_spend, limit);
    assert_eq!(state.current_spend, committed);
    assert_eq!(ledger.outstanding(), 0);
}

struct SlowProvider;

#[async_trait]
impl GenerativeProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: ProviderRequest) -> ProviderResult<ProviderResponse> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(ProviderResponse {
            matched_scenario_id: None,
            confidence: 0.0,
            reply: None,
            extracted_patterns: Vec::new(),
            usage: Some(TokenUsage {
                input_tokens: 2000,
                output_tokens: 400,
            }),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_escalations_respect_limit() {
    let limit = Decimal::new(5, 2);
    let ledger = ledger(limit).await;
    let escalator = TierThreeEscalator::new(Arc::new(SlowProvider), Arc::clone(&ledger)).shared();
    let snapshot = Arc::new(CatalogSnapshot::new(
        tenant(),
        vec![Scenario::new("hold", &["hold"], "One moment.")],
    ));
    let config = Arc::new(TenantConfig::new("acme"));

    let mut handles = Vec::new();
    for i in 0..64 {
        let escalator = Arc::clone(&escalator);
        let request = EscalationRequest {
            utterance: format!("question number {}", i),
            snapshot: Arc::clone(&snapshot),
            tenant: Arc::clone(&config),
            call_id: format!("call-{}", i),
        };
        handles.push(tokio::spawn(async move { escalator.escalate(request).await }));
    }

    let mut committed = Decimal::ZERO;
    let mut denied = 0;
    for outcome in futures::future::join_all(handles).await {
        match outcome.unwrap() {
            EscalationOutcome::Completed { cost, .. } => committed += cost,
            EscalationOutcome::BudgetExhausted { .. } => denied += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert!(denied > 0, "limit should have denied some calls");
    assert!(committed <= limit, "committed {} > limit {}", committed, limit);
    let state = ledger.state(&tenant()).await.unwrap();
    assert_eq!(state.current_spend, committed);
}
