//! Copy-on-write application of learned patterns to a catalog snapshot.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::types::{CatalogSnapshot, Scenario};
use crate::learning::pattern::{LearnedPattern, PatternPayload};
use crate::types::ScenarioId;

/// Result of applying one pattern to one tenant catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ApplyOutcome {
    /// The catalog changed; `version` is the new snapshot version
    Applied { version: u64 },
    /// Pattern id was applied before; catalog unchanged
    AlreadyApplied,
    /// Pattern does not fit this catalog (e.g. references an unknown scenario)
    NotApplicable { reason: String },
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Scenario id given to scenarios created from a learned proposal.
pub fn learned_scenario_id(pattern_id: &str) -> ScenarioId {
    let prefix: String = pattern_id.chars().take(12).collect();
    ScenarioId::new(format!("learned-{}", prefix))
}

fn push_unique(list: &mut Vec<String>, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() || list.iter().any(|p| p.trim().to_lowercase() == phrase) {
        return false;
    }
    list.push(phrase);
    true
}

/// Apply `pattern` to a copy of `current`.
///
/// Returns the new snapshot (version bumped, pattern id recorded) when the
/// catalog changed. Re-applying an id already in `applied_patterns` never
/// changes anything.
pub fn apply_pattern(
    current: &CatalogSnapshot,
    pattern: &LearnedPattern,
    retired: &HashSet<ScenarioId>,
) -> (Option<CatalogSnapshot>, ApplyOutcome) {
    if current.has_applied(pattern.id.as_str()) {
        return (None, ApplyOutcome::AlreadyApplied);
    }

    let mut next = current.clone();
    match &pattern.payload {
        PatternPayload::Keyword {
            scenario_id,
            phrase,
        } => {
            let Some(idx) = next.position(scenario_id) else {
                return (
                    None,
                    ApplyOutcome::NotApplicable {
                        reason: format!("scenario {} not in catalog", scenario_id),
                    },
                );
            };
            push_unique(&mut next.scenarios[idx].trigger_phrases, phrase);
        }
        PatternPayload::NegativeKeyword {
            scenario_id,
            phrase,
        } => {
            let Some(idx) = next.position(scenario_id) else {
                return (
                    None,
                    ApplyOutcome::NotApplicable {
                        reason: format!("scenario {} not in catalog", scenario_id),
                    },
                );
            };
            push_unique(&mut next.scenarios[idx].negative_triggers, phrase);
        }
        PatternPayload::Synonym { variant, canonical } => {
            next.learned_synonyms
                .insert(variant.trim().to_lowercase(), canonical.trim().to_lowercase());
        }
        PatternPayload::Filler { word } => {
            next.learned_fillers.insert(word.trim().to_lowercase());
        }
        PatternPayload::NewScenario {
            triggers,
            reply,
            priority,
        } => {
            let id = learned_scenario_id(pattern.id.as_str());
            if retired.contains(&id) {
                return (
                    None,
                    ApplyOutcome::NotApplicable {
                        reason: format!("scenario id {} was retired", id),
                    },
                );
            }
            if next.get(&id).is_none() {
                let mut scenario = Scenario::new(id.as_str(), &[], reply);
                for t in triggers {
                    push_unique(&mut scenario.trigger_phrases, t);
                }
                scenario.priority = *priority;
                next.scenarios.push(scenario);
            }
        }
    }

    next.applied_patterns.insert(pattern.id.as_str().to_string());
    next.version += 1;
    let version = next.version;
    (Some(next), ApplyOutcome::Applied { version })
}
