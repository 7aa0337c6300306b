//! Pattern learning and promotion.
//!
//! ```text
//!  observe ──► Proposed ──freq ≥ min, conf ≥ min──► Approved/Tenant ──► applied to source tenant
//!                 │                                      │
//!                 └──freq ≥ min, conf < floor──► Rejected│ quality ≥ peer threshold, opted in
//!                                                        ▼
//!                                    auto-approve? ──yes──► Approved/PeerGroup ──► applied to group
//!                                         │no                     │ quality ≥ global threshold,
//!                                         ▼                       │ ≥ N tenants, opted in
//!                                    review queue                 ▼
//!                                                            review queue ──approve──► registry + all tenants
//! ```
//!
//! Records are kept per (source tenant, pattern id); universality counts the
//! distinct tenants that produced the same pattern id.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{PatternError, PatternResult};
use super::pattern::{LearnedPattern, PatternId, PatternPayload, PromotionState, Scope};
use super::quality;
use super::review::{GlobalPatternRegistry, RegistryEntry, ReviewItem, ReviewQueue};
use super::validation::{parse_extracted, validate};
use crate::catalog::{ApplyOutcome, SharedScenarioCatalog};
use crate::config::{LearningPolicy, TenantRegistry};
use crate::escalation::provider::ExtractedPattern;
use crate::events::{Notification, Notifier, ReasonCode};
use crate::types::TenantId;

/// What the pipeline did with one observation or review decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LearningAction {
    /// First sighting for this tenant
    Proposed,
    /// Counted; nothing else changed
    Observed,
    /// Applied to the source tenant's catalog
    AppliedLocally { outcome: ApplyOutcome },
    Rejected { reason: String },
    /// Applied across the peer group
    PromotedToPeerGroup { tenants: usize },
    /// Applied to every tenant and recorded in the registry
    PromotedToGlobal { tenants: usize, registry_version: u64 },
    QueuedForReview { review_id: String, target: Scope },
    Discarded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub pattern_id: Option<PatternId>,
    pub actions: Vec<LearningAction>,
}

impl IngestReport {
    fn discarded(reason: impl Into<String>) -> Self {
        Self {
            pattern_id: None,
            actions: vec![LearningAction::Discarded {
                reason: reason.into(),
            }],
        }
    }
}

type RecordKey = (TenantId, PatternId);

#[derive(Debug, Default)]
struct LearningState {
    records: HashMap<RecordKey, LearnedPattern>,
    /// Distinct tenants per pattern id
    observers: HashMap<PatternId, BTreeSet<TenantId>>,
    /// Promotions an operator turned down; never re-queued
    declined: HashSet<(TenantId, PatternId, Scope)>,
}

/// Validates, scores and promotes learned patterns.
pub struct PatternLearningPipeline {
    catalog: SharedScenarioCatalog,
    tenants: Arc<TenantRegistry>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<LearningState>,
    review: ReviewQueue,
    registry: GlobalPatternRegistry,
}

impl PatternLearningPipeline {
    pub fn new(
        catalog: SharedScenarioCatalog,
        tenants: Arc<TenantRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            catalog,
            tenants,
            notifier,
            state: Mutex::new(LearningState::default()),
            review: ReviewQueue::new(),
            registry: GlobalPatternRegistry::new(),
        }
    }

    /// Create a shared reference to this pipeline
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Validate and observe every extracted pattern. Invalid ones are
    /// logged and discarded.
    pub async fn ingest(&self, tenant: &TenantId, extracted: &[ExtractedPattern]) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(extracted.len());
        for e in extracted {
            let report = match parse_extracted(e) {
                Ok(payload) => match self.observe_at(tenant, payload, e.confidence, Utc::now()).await {
                    Ok(report) => report,
                    Err(err) => {
                        warn!(tenant = %tenant, kind = %e.kind, error = %err, "Pattern observation failed");
                        IngestReport::discarded(err.to_string())
                    }
                },
                Err(err) => {
                    warn!(tenant = %tenant, kind = %e.kind, error = %err, "Discarding invalid pattern");
                    IngestReport::discarded(err.to_string())
                }
            };
            reports.push(report);
        }
        reports
    }

    pub async fn observe(
        &self,
        tenant: &TenantId,
        payload: PatternPayload,
        confidence: f64,
    ) -> PatternResult<IngestReport> {
        self.observe_at(tenant, payload, confidence, Utc::now()).await
    }

    /// [`Self::observe`] with an explicit clock.
    pub async fn observe_at(
        &self,
        tenant: &TenantId,
        payload: PatternPayload,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> PatternResult<IngestReport> {
        let config = self
            .tenants
            .get(tenant)
            .ok_or_else(|| PatternError::UnknownTenant(tenant.clone()))?;
        let policy = &config.learning;
        if !policy.enabled {
            return Ok(IngestReport::discarded("learning disabled for tenant"));
        }
        validate(&payload, confidence)?;

        let id = PatternId::for_payload(&payload);
        let key = (tenant.clone(), id.clone());
        let mut state = self.state.lock().await;

        let observers = {
            let set = state.observers.entry(id.clone()).or_default();
            set.insert(tenant.clone());
            set.clone()
        };

        let mut actions = Vec::new();
        let mut record = match state.records.remove(&key) {
            Some(mut existing) => {
                if existing.promotion_state == PromotionState::Rejected {
                    state.records.insert(key, existing);
                    return Ok(IngestReport {
                        pattern_id: Some(id),
                        actions: vec![LearningAction::Observed],
                    });
                }
                existing.record_observation(confidence, now, policy.observation_window());
                actions.push(LearningAction::Observed);
                existing
            }
            None => {
                let fresh = LearnedPattern::observe_at(tenant.clone(), payload, confidence, now);
                self.notifier.notify(Notification::new(
                    tenant.clone(),
                    ReasonCode::PatternProposed,
                    format!("{} pattern {} proposed", fresh.kind, fresh.id.short()),
                ));
                debug!(tenant = %tenant, pattern_id = %fresh.id.short(), kind = %fresh.kind, "Pattern proposed");
                actions.push(LearningAction::Proposed);
                fresh
            }
        };
        record.observed_tenants = observers;
        record.quality_score = quality::score(&record).total;

        self.evaluate(&mut record, policy, &state.declined, &mut actions)
            .await;
        state.records.insert(key, record);

        Ok(IngestReport {
            pattern_id: Some(id),
            actions,
        })
    }

    async fn evaluate(
        &self,
        record: &mut LearnedPattern,
        policy: &LearningPolicy,
        declined: &HashSet<(TenantId, PatternId, Scope)>,
        actions: &mut Vec<LearningAction>,
    ) {
        if record.promotion_state == PromotionState::Proposed
            && record.observed_frequency >= policy.min_frequency
        {
            if record.confidence >= policy.min_confidence {
                self.apply_locally(record, actions).await;
            } else if record.confidence < policy.reject_below {
                let reason = format!(
                    "mean confidence {:.2} below {:.2}",
                    record.confidence, policy.reject_below
                );
                if record.reject().is_ok() {
                    info!(tenant = %record.source_tenant_id, pattern_id = %record.id.short(), %reason, "Pattern rejected");
                    actions.push(LearningAction::Rejected { reason });
                }
            }
        }

        if record.promotion_state != PromotionState::Approved {
            return;
        }

        if record.scope == Scope::Tenant && policy.share_with_peer_group {
            if let Some(group) = policy.peer_group.as_deref() {
                if record.quality_score >= policy.peer_group_threshold
                    && !declined.contains(&(record.source_tenant_id.clone(), record.id.clone(), Scope::PeerGroup))
                {
                    if policy.peer_group_auto_approve {
                        let tenants = self.apply_to_group(record, group).await;
                        actions.push(LearningAction::PromotedToPeerGroup { tenants });
                    } else {
                        self.queue_review(record, Scope::PeerGroup, actions);
                    }
                }
            }
        }

        if record.scope == Scope::PeerGroup
            && policy.share_globally
            && record.quality_score >= policy.global_threshold
            && record.observed_tenants.len() >= policy.global_min_tenants
            && !self.registry.contains(&record.id)
            && !declined.contains(&(record.source_tenant_id.clone(), record.id.clone(), Scope::Global))
        {
            self.queue_review(record, Scope::Global, actions);
        }
    }

    async fn apply_locally(&self, record: &mut LearnedPattern, actions: &mut Vec<LearningAction>) {
        let tenant = record.source_tenant_id.clone();
        match self.catalog.apply_pattern(&tenant, record).await {
            Ok(ApplyOutcome::NotApplicable { reason }) => {
                if record.reject().is_ok() {
                    info!(tenant = %tenant, pattern_id = %record.id.short(), %reason, "Pattern not applicable; rejected");
                    actions.push(LearningAction::Rejected { reason });
                }
            }
            Ok(outcome) => {
                if record.approve().is_ok() {
                    info!(
                        tenant = %tenant,
                        pattern_id = %record.id.short(),
                        kind = %record.kind,
                        quality = record.quality_score,
                        "Pattern applied to tenant catalog"
                    );
                    actions.push(LearningAction::AppliedLocally { outcome });
                }
            }
            Err(e) => {
                // Stays Proposed; the next observation retries.
                warn!(tenant = %tenant, pattern_id = %record.id.short(), error = %e, "Pattern application failed");
            }
        }
    }

    /// Apply to each tenant; returns how many catalogs changed or already had it.
    async fn apply_to_tenants(&self, record: &LearnedPattern, targets: &[TenantId]) -> usize {
        let mut applied = 0;
        for t in targets {
            match self.catalog.apply_pattern(t, record).await {
                Ok(ApplyOutcome::NotApplicable { reason }) => {
                    debug!(tenant = %t, pattern_id = %record.id.short(), %reason, "Pattern not applicable to tenant");
                }
                Ok(_) => applied += 1,
                Err(e) => {
                    warn!(tenant = %t, pattern_id = %record.id.short(), error = %e, "Pattern application failed");
                }
            }
        }
        applied
    }

    async fn apply_to_group(&self, record: &mut LearnedPattern, group: &str) -> usize {
        let peers = self.tenants.peers(group);
        let applied = self.apply_to_tenants(record, &peers).await;
        if record.promote(Scope::PeerGroup).is_ok() {
            info!(
                tenant = %record.source_tenant_id,
                pattern_id = %record.id.short(),
                group,
                applied,
                "Pattern promoted to peer group"
            );
        }
        applied
    }

    fn queue_review(&self, record: &LearnedPattern, target: Scope, actions: &mut Vec<LearningAction>) {
        if let Some(review_id) = self.review.enqueue(record, target) {
            self.notifier.notify(Notification::new(
                record.source_tenant_id.clone(),
                ReasonCode::PatternReviewRequested,
                format!(
                    "{} pattern {} awaiting {} review (quality {:.1})",
                    record.kind,
                    record.id.short(),
                    target,
                    record.quality_score
                ),
            ));
            info!(review_id = %review_id, target = %target, "Pattern queued for review");
            actions.push(LearningAction::QueuedForReview { review_id, target });
        }
    }

    pub fn pending_reviews(&self) -> Vec<ReviewItem> {
        self.review.pending()
    }

    /// Approve a queued promotion and apply it.
    pub async fn approve_review(&self, review_id: &str) -> PatternResult<Vec<LearningAction>> {
        let item = self.review.take(review_id)?;
        let key = (item.source_tenant_id.clone(), item.pattern_id.clone());
        let mut state = self.state.lock().await;
        let mut record = state.records.remove(&key).unwrap_or(item.pattern);
        let mut actions = Vec::new();

        let result = match item.target_scope {
            Scope::PeerGroup => {
                let config = self.tenants.get(&item.source_tenant_id);
                match config.as_ref().and_then(|c| c.learning.peer_group.clone()) {
                    Some(group) => {
                        let tenants = self.apply_to_group(&mut record, &group).await;
                        actions.push(LearningAction::PromotedToPeerGroup { tenants });
                        if let Some(config) = config {
                            // Reaching peer-group scope may already qualify for global review.
                            self.evaluate(&mut record, &config.learning, &state.declined, &mut actions)
                                .await;
                        }
                        Ok(())
                    }
                    None => Err(PatternError::InvalidTransition {
                        from: record.scope.to_string(),
                        to: "peer_group without a configured group".to_string(),
                    }),
                }
            }
            Scope::Global => match record.promote(Scope::Global) {
                Ok(()) => {
                    let registry_version = self.registry.append(record.clone());
                    let all = self.tenants.tenant_ids();
                    let tenants = self.apply_to_tenants(&record, &all).await;
                    info!(
                        pattern_id = %record.id.short(),
                        registry_version,
                        tenants,
                        "Pattern promoted to global registry"
                    );
                    actions.push(LearningAction::PromotedToGlobal {
                        tenants,
                        registry_version,
                    });
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Scope::Tenant => Err(PatternError::InvalidTransition {
                from: record.scope.to_string(),
                to: Scope::Tenant.to_string(),
            }),
        };

        state.records.insert(key, record);
        result.map(|()| actions)
    }

    /// Decline a queued promotion. The pattern keeps its current scope and
    /// is never queued for that scope again.
    pub async fn reject_review(&self, review_id: &str) -> PatternResult<ReviewItem> {
        let item = self.review.take(review_id)?;
        let mut state = self.state.lock().await;
        state.declined.insert((
            item.source_tenant_id.clone(),
            item.pattern_id.clone(),
            item.target_scope,
        ));
        info!(review_id, "Pattern review declined");
        Ok(item)
    }

    pub async fn pattern(&self, tenant: &TenantId, id: &PatternId) -> Option<LearnedPattern> {
        let state = self.state.lock().await;
        state.records.get(&(tenant.clone(), id.clone())).cloned()
    }

    pub async fn patterns_for(&self, tenant: &TenantId) -> Vec<LearnedPattern> {
        let state = self.state.lock().await;
        let mut out: Vec<LearnedPattern> = state
            .records
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, p)| p.clone())
            .collect();
        out.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn registry_entries(&self) -> Vec<RegistryEntry> {
        self.registry.entries()
    }

    pub fn registry_version(&self) -> u64 {
        self.registry.version()
    }
}
