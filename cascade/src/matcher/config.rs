//! Tenant-configurable matcher inputs.
//!
//! Signal weights are NOT here: they are fixed constants in
//! [`crate::matcher::tier_one`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower bound of an urgency keyword weight.
pub const MIN_URGENCY_WEIGHT: f64 = 0.1;
/// Upper bound of an urgency keyword weight.
pub const MAX_URGENCY_WEIGHT: f64 = 0.5;

/// Default disfluencies removed before scoring.
pub const DEFAULT_FILLERS: &[&str] = &[
    "um", "umm", "uh", "uhm", "er", "erm", "ah", "hmm", "mm", "basically", "literally",
    "you know", "i mean", "kind of", "sort of",
];

/// Config bundle for tiers one and two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Filler words or phrases removed from the utterance
    pub filler_words: Vec<String>,
    /// Variant phrase -> canonical phrase (many-to-one)
    pub synonyms: BTreeMap<String, String>,
    /// Urgency keyword -> additive boost, clamped to [0.1, 0.5]
    pub urgency_keywords: BTreeMap<String, f64>,
    /// Extra negative triggers keyed by scenario id
    pub negative_triggers: BTreeMap<String, Vec<String>>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            filler_words: DEFAULT_FILLERS.iter().map(|s| s.to_string()).collect(),
            synonyms: BTreeMap::new(),
            urgency_keywords: BTreeMap::new(),
            negative_triggers: BTreeMap::new(),
        }
    }
}

impl MatcherConfig {
    pub fn with_synonym(mut self, variant: &str, canonical: &str) -> Self {
        self.synonyms
            .insert(variant.to_string(), canonical.to_string());
        self
    }

    pub fn with_filler(mut self, word: &str) -> Self {
        self.filler_words.push(word.to_string());
        self
    }

    pub fn with_urgency(mut self, keyword: &str, weight: f64) -> Self {
        self.urgency_keywords.insert(keyword.to_string(), weight);
        self
    }

    pub fn with_negative(mut self, scenario_id: &str, phrase: &str) -> Self {
        self.negative_triggers
            .entry(scenario_id.to_string())
            .or_default()
            .push(phrase.to_string());
        self
    }

    /// Urgency weight for a keyword, clamped into the allowed band.
    pub fn urgency_weight(raw: f64) -> f64 {
        if raw.is_nan() {
            return MIN_URGENCY_WEIGHT;
        }
        raw.clamp(MIN_URGENCY_WEIGHT, MAX_URGENCY_WEIGHT)
    }

    /// Stable digest of the config, used to key derived matcher state.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_weight_is_bounded() {
        assert_eq!(MatcherConfig::urgency_weight(0.9), MAX_URGENCY_WEIGHT);
        assert_eq!(MatcherConfig::urgency_weight(0.01), MIN_URGENCY_WEIGHT);
        assert_eq!(MatcherConfig::urgency_weight(0.3), 0.3);
        assert_eq!(MatcherConfig::urgency_weight(f64::NAN), MIN_URGENCY_WEIGHT);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = MatcherConfig::default();
        let b = MatcherConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = MatcherConfig::default().with_synonym("wait", "hold");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_toml_partial_config_keeps_default_fillers() {
        let cfg: MatcherConfig = toml::from_str(
            r#"
[synonyms]
"wait a sec" = "hold"
"#,
        )
        .unwrap();
        assert!(cfg.filler_words.iter().any(|f| f == "um"));
        assert_eq!(cfg.synonyms.get("wait a sec").map(String::as_str), Some("hold"));
    }
}
