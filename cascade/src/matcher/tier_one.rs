//! Tier One: deterministic rule-based scorer.
//!
//! ```text
//! utterance
//!   ├─ tokenize (lowercase, strip punctuation) ──► negative-trigger veto
//!   ├─ strip fillers
//!   ├─ expand synonyms
//!   └─ per scenario:
//!        0.40 lexical (BM25) + 0.30 semantic-lite + 0.20 pattern + 0.10 context
//!        + urgency boost (top emergency scenario only)
//!   └─ tie-break: priority, then catalog order
//! ```
//!
//! No I/O, no randomness: the same snapshot, config and utterance always
//! yield the same `(scenario_id, confidence, signals)`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::types::CatalogSnapshot;
use crate::matcher::config::MatcherConfig;
use crate::matcher::normalize::{contains_phrase, light_stem, NormalizedUtterance};
use crate::matcher::prepared::{pick_winner, PreparedCache, PreparedCatalog, PreparedScenario};
use crate::matcher::UtteranceMatcher;
use crate::types::{MatchResult, Tier};

/// Weight of the BM25 lexical family.
pub const WEIGHT_LEXICAL: f64 = 0.40;
/// Weight of the soft token-overlap family.
pub const WEIGHT_SEMANTIC: f64 = 0.30;
/// Weight of the regex / phrase-hit family.
pub const WEIGHT_PATTERN: f64 = 0.20;
/// Weight of the context-keyword family.
pub const WEIGHT_CONTEXT: f64 = 0.10;

/// Credit for a stem-only token match in the semantic-lite family.
const STEM_MATCH_CREDIT: f64 = 0.8;
/// Credit for a partial (non-contiguous) trigger hit.
const PARTIAL_PATTERN_CREDIT: f64 = 0.5;

pub const SIGNAL_LEXICAL: &str = "lexical";
pub const SIGNAL_SEMANTIC: &str = "semantic";
pub const SIGNAL_PATTERN: &str = "pattern";
pub const SIGNAL_CONTEXT: &str = "context";
pub const SIGNAL_URGENCY: &str = "urgency";

/// Per-family scores for one scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalScores {
    pub lexical: f64,
    pub semantic: f64,
    pub pattern: f64,
    pub context: f64,
    pub urgency: f64,
}

impl SignalScores {
    pub fn weighted(&self) -> f64 {
        WEIGHT_LEXICAL * self.lexical
            + WEIGHT_SEMANTIC * self.semantic
            + WEIGHT_PATTERN * self.pattern
            + WEIGHT_CONTEXT * self.context
    }

    /// Final confidence: weighted families plus urgency, clamped to 1.
    pub fn confidence(&self) -> f64 {
        (self.weighted() + self.urgency).clamp(0.0, 1.0)
    }

    fn into_signals(self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (SIGNAL_LEXICAL.to_string(), self.lexical),
            (SIGNAL_SEMANTIC.to_string(), self.semantic),
            (SIGNAL_PATTERN.to_string(), self.pattern),
            (SIGNAL_CONTEXT.to_string(), self.context),
            (SIGNAL_URGENCY.to_string(), self.urgency),
        ])
    }
}

/// Deterministic rule-based matcher.
#[derive(Debug, Default)]
pub struct TierOneMatcher {
    cache: Arc<PreparedCache>,
}

impl TierOneMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher that reads and fills an existing prepared-state cache.
    pub fn with_cache(cache: Arc<PreparedCache>) -> Self {
        Self { cache }
    }

    /// Create a shared reference to this matcher
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Score `utterance` against the snapshot. Never fails.
    pub fn match_utterance(
        &self,
        utterance: &str,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult {
        let started = Instant::now();
        let prepared = self.cache.get_or_build(snapshot, config);
        let result = score_prepared(&prepared, utterance);
        result.with_elapsed_ms(started.elapsed().as_secs_f64() * 1000.0)
    }

    /// Per-family scores for every scenario, in catalog order (for tooling).
    pub fn explain(
        &self,
        utterance: &str,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> Vec<(String, SignalScores, bool)> {
        let prepared = self.cache.get_or_build(snapshot, config);
        let norm = prepared.normalizer.normalize(utterance);
        let scored = score_all(&prepared, &norm);
        prepared
            .scenarios
            .iter()
            .enumerate()
            .map(|(idx, s)| match scored.iter().find(|(i, _)| *i == idx) {
                Some((_, scores)) => (s.id.to_string(), *scores, false),
                None => (s.id.to_string(), SignalScores::default(), true),
            })
            .collect()
    }
}

impl UtteranceMatcher for TierOneMatcher {
    fn match_utterance(
        &self,
        utterance: &str,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult {
        TierOneMatcher::match_utterance(self, utterance, snapshot, config)
    }
}

fn empty_result() -> MatchResult {
    MatchResult {
        scenario_id: None,
        confidence: 0.0,
        tier: Tier::One,
        signals: SignalScores::default().into_signals(),
        elapsed_ms: 0.0,
    }
}

/// Score every scenario and pick the winner.
pub(crate) fn score_prepared(prepared: &PreparedCatalog, utterance: &str) -> MatchResult {
    let norm = prepared.normalizer.normalize(utterance);
    if norm.is_empty() {
        return empty_result();
    }
    let per_scenario = score_all(prepared, &norm);

    let scored: Vec<(usize, f64)> = per_scenario
        .iter()
        .map(|(i, s)| (*i, s.confidence()))
        .collect();

    match pick_winner(&scored, &prepared.scenarios) {
        Some((idx, confidence)) => {
            let scores = per_scenario
                .iter()
                .find(|(i, _)| *i == idx)
                .map(|(_, s)| *s)
                .unwrap_or_default();
            MatchResult {
                scenario_id: Some(prepared.scenarios[idx].id.clone()),
                confidence,
                tier: Tier::One,
                signals: scores.into_signals(),
                elapsed_ms: 0.0,
            }
        }
        None => empty_result(),
    }
}

/// Scores of every non-vetoed scenario, urgency boost applied.
fn score_all(prepared: &PreparedCatalog, norm: &NormalizedUtterance) -> Vec<(usize, SignalScores)> {
    if norm.is_empty() {
        return Vec::new();
    }
    let mut per_scenario: Vec<(usize, SignalScores)> = prepared
        .scenarios
        .iter()
        .enumerate()
        // Vetoed scenarios are dropped before any boosting can touch them.
        .filter(|(_, s)| !s.is_vetoed(&norm.tokens))
        .map(|(i, s)| (i, score_scenario(prepared, s, norm)))
        .collect();

    let boost = prepared.urgency_boost(&norm.tokens);
    if boost > 0.0 {
        let top_emergency = per_scenario
            .iter_mut()
            .filter(|(i, _)| prepared.scenarios[*i].emergency)
            .max_by(|(ia, a), (ib, b)| {
                a.confidence()
                    .total_cmp(&b.confidence())
                    .then_with(|| ib.cmp(ia))
            });
        if let Some((_, scores)) = top_emergency {
            scores.urgency = boost;
        }
    }
    per_scenario
}

fn score_scenario(
    prepared: &PreparedCatalog,
    scenario: &PreparedScenario,
    norm: &NormalizedUtterance,
) -> SignalScores {
    let utterance_set: HashSet<&str> = norm.expanded.iter().map(String::as_str).collect();
    let utterance_stems: HashSet<&str> = norm.expanded.iter().map(|t| light_stem(t)).collect();

    let mut lexical: f64 = 0.0;
    let mut semantic: f64 = 0.0;
    let mut pattern: f64 = 0.0;

    for (trigger, doc) in scenario.triggers.iter().zip(&scenario.doc_ids) {
        lexical = lexical.max(prepared.index.normalized_score(*doc, &norm.expanded));

        let credit: f64 = trigger
            .iter()
            .map(|t| {
                if utterance_set.contains(t.as_str()) {
                    1.0
                } else if utterance_stems.contains(light_stem(t)) {
                    STEM_MATCH_CREDIT
                } else {
                    0.0
                }
            })
            .sum();
        semantic = semantic.max(credit / trigger.len() as f64);

        if contains_phrase(&norm.expanded, trigger) {
            pattern = 1.0;
        } else if trigger.iter().all(|t| utterance_set.contains(t.as_str())) {
            pattern = pattern.max(PARTIAL_PATTERN_CREDIT);
        }
    }

    if pattern < 1.0 && !scenario.patterns.is_empty() {
        let text = norm.text();
        if scenario.patterns.iter().any(|re| re.is_match(&text)) {
            pattern = 1.0;
        }
    }

    let in_vocab = norm
        .expanded
        .iter()
        .filter(|t| scenario.vocabulary.contains(t.as_str()))
        .count();
    let context = in_vocab as f64 / norm.expanded.len() as f64;

    SignalScores {
        lexical,
        semantic,
        pattern,
        context,
        urgency: 0.0,
    }
}
