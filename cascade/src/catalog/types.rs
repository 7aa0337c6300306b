//! Scenario and catalog snapshot types.

use crate::types::{ScenarioId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::error::{CatalogError, CatalogResult};

/// One unit of catalog knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    /// Exact or near-exact lexical triggers (non-empty)
    pub trigger_phrases: Vec<String>,
    /// Any of these in the utterance excludes the scenario
    #[serde(default)]
    pub negative_triggers: Vec<String>,
    #[serde(default)]
    pub quick_reply: String,
    #[serde(default)]
    pub full_reply: String,
    /// Higher wins among equal-confidence matches
    #[serde(default)]
    pub priority: i32,
    /// Per-scenario threshold; only applied when stricter than the tenant's
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Regex patterns feeding the pattern signal
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Keywords feeding the context signal
    #[serde(default)]
    pub context_keywords: Vec<String>,
    /// Eligible for urgency boosting
    #[serde(default)]
    pub emergency: bool,
}

impl Scenario {
    pub fn new(id: impl Into<String>, triggers: &[&str], reply: &str) -> Self {
        Self {
            id: ScenarioId::new(id),
            trigger_phrases: triggers.iter().map(|t| t.to_string()).collect(),
            negative_triggers: Vec::new(),
            quick_reply: reply.to_string(),
            full_reply: reply.to_string(),
            priority: 0,
            min_confidence: None,
            patterns: Vec::new(),
            context_keywords: Vec::new(),
            emergency: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_negative(mut self, phrase: &str) -> Self {
        self.negative_triggers.push(phrase.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }

    pub fn with_context(mut self, keyword: &str) -> Self {
        self.context_keywords.push(keyword.to_string());
        self
    }

    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn emergency(mut self) -> Self {
        self.emergency = true;
        self
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(CatalogError::InvalidScenario {
                id: self.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if self.trigger_phrases.iter().all(|t| t.trim().is_empty()) {
            return Err(CatalogError::InvalidScenario {
                id: self.id.clone(),
                reason: "trigger_phrases must be non-empty".to_string(),
            });
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(CatalogError::InvalidScenario {
                    id: self.id.clone(),
                    reason: format!("min_confidence {} outside [0,1]", min),
                });
            }
        }
        Ok(())
    }

    /// Reply text for the decision: quick reply when present, else full.
    pub fn reply(&self) -> &str {
        if self.quick_reply.trim().is_empty() {
            &self.full_reply
        } else {
            &self.quick_reply
        }
    }
}

/// Immutable, versioned view of one tenant's catalog.
///
/// Matchers hold an `Arc<CatalogSnapshot>` for the duration of a call; edits
/// produce a new snapshot with a higher version instead of mutating this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub tenant_id: TenantId,
    pub version: u64,
    /// Scenarios in insertion order
    pub scenarios: Vec<Scenario>,
    /// Synonyms learned from tier 3 (variant -> canonical)
    #[serde(default)]
    pub learned_synonyms: BTreeMap<String, String>,
    /// Filler words learned from tier 3
    #[serde(default)]
    pub learned_fillers: BTreeSet<String>,
    /// Pattern ids already applied to this catalog
    #[serde(default)]
    pub applied_patterns: BTreeSet<String>,
}

impl CatalogSnapshot {
    pub fn new(tenant_id: TenantId, scenarios: Vec<Scenario>) -> Self {
        Self {
            tenant_id,
            version: 1,
            scenarios,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &ScenarioId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| &s.id == id)
    }

    pub fn position(&self, id: &ScenarioId) -> Option<usize> {
        self.scenarios.iter().position(|s| &s.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn has_applied(&self, pattern_id: &str) -> bool {
        self.applied_patterns.contains(pattern_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_requires_triggers() {
        let mut s = Scenario::new("hold", &["hold"], "Sure, one moment.");
        assert!(s.validate().is_ok());
        s.trigger_phrases = vec!["  ".to_string()];
        assert!(matches!(
            s.validate(),
            Err(CatalogError::InvalidScenario { .. })
        ));
    }

    #[test]
    fn test_min_confidence_range_checked() {
        let s = Scenario::new("hold", &["hold"], "ok").with_min_confidence(1.5);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_reply_prefers_quick() {
        let mut s = Scenario::new("hold", &["hold"], "quick");
        s.full_reply = "full".to_string();
        assert_eq!(s.reply(), "quick");
        s.quick_reply.clear();
        assert_eq!(s.reply(), "full");
    }

    #[test]
    fn test_snapshot_lookup() {
        let snap = CatalogSnapshot::new(
            TenantId::from("acme"),
            vec![
                Scenario::new("a", &["alpha"], "A"),
                Scenario::new("b", &["beta"], "B"),
            ],
        );
        assert_eq!(snap.position(&ScenarioId::from("b")), Some(1));
        assert!(snap.get(&ScenarioId::from("c")).is_none());
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn test_scenario_toml_defaults() {
        let s: Scenario = toml::from_str(
            r#"
id = "hold"
trigger_phrases = ["hold", "one moment"]
quick_reply = "Sure."
"#,
        )
        .unwrap();
        assert_eq!(s.priority, 0);
        assert!(!s.emergency);
        assert!(s.negative_triggers.is_empty());
    }
}
