//! Free matching tiers.
//!
//! Both tiers are pure computations over one [`CatalogSnapshot`]: no I/O,
//! no randomness. Derived state (tokenized triggers, BM25 statistics,
//! compiled regexes, embeddings) is cached per tenant and keyed by catalog
//! version and config fingerprint.

pub mod config;
pub mod embedding;
pub mod lexical;
pub mod normalize;
pub mod prepared;
pub mod tier_one;
pub mod tier_two;

use crate::catalog::types::CatalogSnapshot;
use crate::types::MatchResult;

pub use config::MatcherConfig;
pub use prepared::PreparedCache;
pub use tier_one::{SignalScores, TierOneMatcher};
pub use tier_two::{SimilarityConfig, TierTwoBooster};

/// Tier One seam.
pub trait UtteranceMatcher: Send + Sync {
    fn match_utterance(
        &self,
        utterance: &str,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult;
}

/// Tier Two seam.
pub trait SimilarityBooster: Send + Sync {
    fn boost(
        &self,
        utterance: &str,
        tier_one: &MatchResult,
        snapshot: &CatalogSnapshot,
        config: &MatcherConfig,
    ) -> MatchResult;
}
