//! Tier Two: hashed-embedding similarity re-scorer.
//!
//! Invoked only when Tier One is inconclusive. Each trigger is embedded
//! twice (bag of stems, character trigrams); the utterance is scored against
//! every trigger and the best cosine per scenario wins. Negative triggers
//! still veto and ties break exactly as in Tier One.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::types::CatalogSnapshot;
use crate::matcher::config::MatcherConfig;
use crate::matcher::embedding::{cosine, embed_trigrams, embed_words, DEFAULT_DIMENSION};
use crate::matcher::prepared::{pick_winner, PreparedCache, PreparedCatalog};
use crate::matcher::SimilarityBooster;
use crate::types::{MatchResult, TenantId, Tier};

pub const WORD_WEIGHT: f64 = 0.5;
pub const TRIGRAM_WEIGHT: f64 = 0.5;

pub const SIGNAL_WORD: &str = "word";
pub const SIGNAL_TRIGRAM: &str = "trigram";

/// Tier Two settings, shared by all tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub enabled: bool,
    /// Hashed embedding width; 0 disables the index
    pub dimension: usize,
    /// Catalogs larger than this are not indexed
    pub max_indexed_scenarios: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dimension: DEFAULT_DIMENSION,
            max_indexed_scenarios: 5_000,
        }
    }
}

struct TriggerVectors {
    words: Vec<f32>,
    trigrams: Vec<f32>,
}

/// Embedded triggers for one prepared catalog.
struct SimilarityIndex {
    version: u64,
    fingerprint: String,
    dimension: usize,
    /// Per scenario, per trigger
    vectors: Vec<Vec<TriggerVectors>>,
}

impl SimilarityIndex {
    fn build(prepared: &PreparedCatalog, dimension: usize) -> Self {
        let vectors = prepared
            .scenarios
            .iter()
            .map(|s| {
                s.triggers
                    .iter()
                    .map(|t| TriggerVectors {
                        words: embed_words(t, dimension),
                        trigrams: embed_trigrams(t, dimension),
                    })
                    .collect()
            })
            .collect();
        Self {
            version: prepared.version,
            fingerprint: prepared.fingerprint.clone(),
            dimension,
            vectors,
        }
    }
}

/// Similarity re-scorer with a per-tenant index cache.
pub struct TierTwoBooster {
    config: SimilarityConfig,
    prepared: Arc<PreparedCache>,
    indexes: Mutex<HashMap<TenantId, Arc<SimilarityIndex>>>,
}

impl std::fmt::Debug for TierTwoBooster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierTwoBooster")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TierTwoBooster {
    fn default() -> Self {
        Self::new(SimilarityConfig::default())
    }
}

impl TierTwoBooster {
    pub fn new(config: SimilarityConfig) -> Self {
        Self::with_cache(config, PreparedCache::new().shared())
    }

    /// Booster that reuses the prepared state Tier One already built.
    pub fn with_cache(config: SimilarityConfig, prepared: Arc<PreparedCache>) -> Self {
        Self {
            config,
            prepared,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Create a shared reference to this booster
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Whether an index can be built for a catalog of this size.
    pub fn is_available(&self, scenario_count: usize) -> bool {
        self.config.enabled
            && self.config.dimension > 0
            && scenario_count <= self.config.max_indexed_scenarios
    }

    fn index_for(&self, prepared: &PreparedCatalog) -> Arc<SimilarityIndex> {
        if let Ok(indexes) = self.indexes.lock() {
            if let Some(hit) = indexes.get(&prepared.tenant_id) {
                if hit.version == prepared.version
                    && hit.fingerprint == prepared.fingerprint
                    && hit.dimension == self.config.dimension
                {
                    return Arc::clone(hit);
                }
            }
        }
        let built = Arc::new(SimilarityIndex::build(prepared, self.config.dimension));
        debug!(
            tenant = %prepared.tenant_id,
            version = prepared.version,
            dimension = self.config.dimension,
            "Rebuilt similarity index"
        );
        if let Ok(mut indexes) = self.indexes.lock() {
            indexes.insert(prepared.tenant_id.clone(), Arc::clone(&built));
        }
        built
    }

    /// Re-score `utterance`; degrades to `tier_one` unchanged when the index
    /// is unavailable.
    pub fn boost(
        &self,
        utterance: &str,
        tier_one: &MatchResult,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult {
        if !self.is_available(snapshot.len()) {
            debug!(
                tenant = %snapshot.tenant_id,
                scenarios = snapshot.len(),
                "Similarity index unavailable, keeping tier one result"
            );
            return tier_one.clone();
        }

        let started = Instant::now();
        let prepared = self.prepared.get_or_build(snapshot, config);
        let index = self.index_for(&prepared);
        let norm = prepared.normalizer.normalize(utterance);

        let empty_signals = || {
            BTreeMap::from([
                (SIGNAL_WORD.to_string(), 0.0),
                (SIGNAL_TRIGRAM.to_string(), 0.0),
            ])
        };
        let mut result = MatchResult {
            scenario_id: None,
            confidence: 0.0,
            tier: Tier::Two,
            signals: empty_signals(),
            elapsed_ms: 0.0,
        };

        if !norm.is_empty() {
            let words = embed_words(&norm.expanded, index.dimension);
            let trigrams = embed_trigrams(&norm.expanded, index.dimension);

            let mut best_parts: HashMap<usize, (f64, f64)> = HashMap::new();
            let mut scored: Vec<(usize, f64)> = Vec::new();
            for (i, scenario) in prepared.scenarios.iter().enumerate() {
                if scenario.is_vetoed(&norm.tokens) {
                    continue;
                }
                let mut best = (0.0, 0.0, 0.0);
                for tv in &index.vectors[i] {
                    let w = cosine(&words, &tv.words);
                    let t = cosine(&trigrams, &tv.trigrams);
                    let combined = WORD_WEIGHT * w + TRIGRAM_WEIGHT * t;
                    if combined > best.0 {
                        best = (combined, w, t);
                    }
                }
                best_parts.insert(i, (best.1, best.2));
                scored.push((i, best.0));
            }

            if let Some((idx, _)) = pick_winner(&scored, &prepared.scenarios) {
                let (w, t) = best_parts.get(&idx).copied().unwrap_or_default();
                result.scenario_id = Some(prepared.scenarios[idx].id.clone());
                // Recomputed from the signals so the two always agree.
                result.confidence = (WORD_WEIGHT * w + TRIGRAM_WEIGHT * t).clamp(0.0, 1.0);
                result.signals = BTreeMap::from([
                    (SIGNAL_WORD.to_string(), w),
                    (SIGNAL_TRIGRAM.to_string(), t),
                ]);
            }
        }

        result.with_elapsed_ms(started.elapsed().as_secs_f64() * 1000.0)
    }
}

impl SimilarityBooster for TierTwoBooster {
    fn boost(
        &self,
        utterance: &str,
        tier_one: &MatchResult,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult {
        TierTwoBooster::boost(self, utterance, tier_one, snapshot, config)
    }
}
