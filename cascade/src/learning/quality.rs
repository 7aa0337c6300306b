//! Pattern quality scoring.
//!
//! `quality = 0.4·confidence + 0.3·frequency + 0.2·universality + 0.1·impact`,
//! every sub-score on a 0–100 scale.

use serde::{Deserialize, Serialize};

use super::pattern::LearnedPattern;

pub const CONFIDENCE_WEIGHT: f64 = 0.4;
pub const FREQUENCY_WEIGHT: f64 = 0.3;
pub const UNIVERSALITY_WEIGHT: f64 = 0.2;
pub const IMPACT_WEIGHT: f64 = 0.1;

/// Observations at which the frequency sub-score saturates.
pub const FREQUENCY_SATURATION: f64 = 10.0;
/// Distinct tenants at which the universality sub-score saturates.
pub const UNIVERSALITY_SATURATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub confidence: f64,
    pub frequency: f64,
    pub universality: f64,
    pub impact: f64,
    pub total: f64,
}

pub fn frequency_score(observations: u32) -> f64 {
    let f = f64::from(observations);
    100.0 * ((1.0 + f).ln() / (1.0 + FREQUENCY_SATURATION).ln()).min(1.0)
}

pub fn universality_score(distinct_tenants: usize) -> f64 {
    100.0 * (distinct_tenants as f64 / UNIVERSALITY_SATURATION).min(1.0)
}

pub fn score(pattern: &LearnedPattern) -> QualityBreakdown {
    let confidence = (pattern.confidence * 100.0).clamp(0.0, 100.0);
    let frequency = frequency_score(pattern.observed_frequency);
    let universality = universality_score(pattern.observed_tenants.len());
    let impact = pattern.kind.impact();
    let total = CONFIDENCE_WEIGHT * confidence
        + FREQUENCY_WEIGHT * frequency
        + UNIVERSALITY_WEIGHT * universality
        + IMPACT_WEIGHT * impact;
    QualityBreakdown {
        confidence,
        frequency,
        universality,
        impact,
        total: total.clamp(0.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::pattern::PatternPayload;
    use crate::types::TenantId;

    #[test]
    fn test_frequency_saturates_at_ten() {
        assert_eq!(frequency_score(0), 0.0);
        assert!((frequency_score(10) - 100.0).abs() < 1e-9);
        assert_eq!(frequency_score(500), 100.0);
        assert!(frequency_score(3) < frequency_score(4));
    }

    #[test]
    fn test_single_tenant_new_scenario() {
        let p = LearnedPattern::observe(
            TenantId::from("a"),
            PatternPayload::NewScenario {
                triggers: vec!["parking".into()],
                reply: "Lot B".into(),
                priority: 0,
            },
            0.9,
        );
        let q = score(&p);
        // 0.4*90 + 0.3*28.9 + 0.2*20 + 0.1*100
        assert!((q.total - (36.0 + 0.3 * frequency_score(1) + 4.0 + 10.0)).abs() < 1e-9);
        assert!(q.total < 85.0);
    }

    #[test]
    fn test_widely_seen_pattern_scores_high() {
        let mut p = LearnedPattern::observe(
            TenantId::from("a"),
            PatternPayload::Synonym {
                variant: "gimme a sec".into(),
                canonical: "hold".into(),
            },
            0.95,
        );
        p.observed_frequency = 12;
        for t in ["b", "c", "d", "e"] {
            p.observed_tenants.insert(TenantId::from(t));
        }
        let q = score(&p);
        assert!(q.total >= 90.0, "total {}", q.total);
    }
}
