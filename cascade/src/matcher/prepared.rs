//! Derived matcher state for one (catalog version, config) pair.
//!
//! Building this is the expensive part of matching (tokenizing every
//! trigger, BM25 statistics, regex compilation), so it is cached per tenant
//! and rebuilt only when the snapshot version or config fingerprint changes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::types::CatalogSnapshot;
use crate::matcher::config::MatcherConfig;
use crate::matcher::lexical::Bm25Index;
use crate::matcher::normalize::{contains_phrase, tokenize, Normalizer};
use crate::types::{ScenarioId, TenantId};

/// Scores within this distance of the best are treated as tied.
pub const TIE_EPSILON: f64 = 0.01;

/// One scenario, pre-tokenized.
#[derive(Debug, Clone)]
pub struct PreparedScenario {
    pub id: ScenarioId,
    /// Catalog insertion order
    pub position: usize,
    pub priority: i32,
    pub emergency: bool,
    pub min_confidence: Option<f64>,
    /// Triggers in canonical vocabulary
    pub triggers: Vec<Vec<String>>,
    /// BM25 document id of each trigger
    pub doc_ids: Vec<usize>,
    /// Negative phrases, tokenized only (no filler/synonym processing)
    pub negatives: Vec<Vec<String>>,
    pub patterns: Vec<Regex>,
    /// Trigger tokens plus context keywords
    pub vocabulary: HashSet<String>,
}

impl PreparedScenario {
    /// Whether any negative phrase occurs in the raw token sequence.
    pub fn is_vetoed(&self, raw_tokens: &[String]) -> bool {
        self.negatives
            .iter()
            .any(|neg| contains_phrase(raw_tokens, neg))
    }
}

#[derive(Debug)]
pub struct PreparedCatalog {
    pub tenant_id: TenantId,
    pub version: u64,
    pub fingerprint: String,
    pub normalizer: Normalizer,
    pub scenarios: Vec<PreparedScenario>,
    pub index: Bm25Index,
    /// Urgency phrases with clamped weights
    pub urgency: Vec<(Vec<String>, f64)>,
}

impl PreparedCatalog {
    pub fn build(snapshot: &CatalogSnapshot, config: &MatcherConfig) -> Self {
        let normalizer = Normalizer::new(config, snapshot);
        let mut documents: Vec<Vec<String>> = Vec::new();
        let mut scenarios = Vec::with_capacity(snapshot.scenarios.len());

        for (position, s) in snapshot.scenarios.iter().enumerate() {
            let mut triggers = Vec::new();
            let mut doc_ids = Vec::new();
            let mut vocabulary = HashSet::new();
            for phrase in &s.trigger_phrases {
                let tokens = normalizer.normalize_trigger(phrase);
                if tokens.is_empty() {
                    continue;
                }
                vocabulary.extend(tokens.iter().cloned());
                doc_ids.push(documents.len());
                documents.push(tokens.clone());
                triggers.push(tokens);
            }
            for kw in &s.context_keywords {
                vocabulary.extend(normalizer.normalize_trigger(kw));
            }

            let extra = config
                .negative_triggers
                .get(s.id.as_str())
                .into_iter()
                .flatten();
            let negatives = s
                .negative_triggers
                .iter()
                .chain(extra)
                .map(|n| tokenize(n))
                .filter(|n| !n.is_empty())
                .collect();

            let patterns = s
                .patterns
                .iter()
                .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(scenario = %s.id, pattern = %p, error = %e, "Ignoring invalid scenario pattern");
                        None
                    }
                })
                .collect();

            scenarios.push(PreparedScenario {
                id: s.id.clone(),
                position,
                priority: s.priority,
                emergency: s.emergency,
                min_confidence: s.min_confidence,
                triggers,
                doc_ids,
                negatives,
                patterns,
                vocabulary,
            });
        }

        let urgency = config
            .urgency_keywords
            .iter()
            .map(|(k, w)| (tokenize(k), MatcherConfig::urgency_weight(*w)))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        Self {
            tenant_id: snapshot.tenant_id.clone(),
            version: snapshot.version,
            fingerprint: config.fingerprint(),
            normalizer,
            scenarios,
            index: Bm25Index::build(&documents),
            urgency,
        }
    }

    /// Largest urgency weight whose keyword occurs in the raw tokens.
    pub fn urgency_boost(&self, raw_tokens: &[String]) -> f64 {
        self.urgency
            .iter()
            .filter(|(k, _)| contains_phrase(raw_tokens, k))
            .map(|(_, w)| *w)
            .fold(0.0, f64::max)
    }
}

/// Pick the winning scenario among `(scenario index, score)` pairs.
///
/// Candidates within [`TIE_EPSILON`] of the best score are ordered by
/// priority (higher first), then catalog position (earlier first).
pub fn pick_winner(scored: &[(usize, f64)], scenarios: &[PreparedScenario]) -> Option<(usize, f64)> {
    let best = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);
    if best <= 0.0 {
        return None;
    }
    scored
        .iter()
        .filter(|(_, s)| *s >= best - TIE_EPSILON)
        .min_by(|(a, _), (b, _)| {
            let (sa, sb) = (&scenarios[*a], &scenarios[*b]);
            sb.priority
                .cmp(&sa.priority)
                .then_with(|| sa.position.cmp(&sb.position))
        })
        .copied()
}

/// Per-tenant cache of [`PreparedCatalog`]s, shared by both free tiers.
#[derive(Debug, Default)]
pub struct PreparedCache {
    entries: Mutex<HashMap<TenantId, Arc<PreparedCatalog>>>,
    builds: AtomicU64,
}

impl PreparedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this cache
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times derived state has been built.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Cached state for this snapshot and config, building it on a miss.
    pub fn get_or_build(
        &self,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> Arc<PreparedCatalog> {
        let fingerprint = config.fingerprint();
        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&snapshot.tenant_id) {
                if hit.version == snapshot.version && hit.fingerprint == fingerprint {
                    return Arc::clone(hit);
                }
            }
        }

        let built = Arc::new(PreparedCatalog::build(snapshot, config));
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            tenant = %snapshot.tenant_id,
            version = snapshot.version,
            scenarios = built.scenarios.len(),
            "Rebuilt matcher state"
        );
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(snapshot.tenant_id.clone(), Arc::clone(&built));
        }
        built
    }

    /// Forget derived state for a tenant.
    pub fn invalidate(&self, tenant: &TenantId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(tenant);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
