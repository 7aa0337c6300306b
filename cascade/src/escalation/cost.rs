//! Token estimation and Tier 3 pricing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::provider::TokenUsage;

/// Estimates token counts for pricing.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text.
    fn estimate(&self, text: &str) -> u32;

    /// Estimator name for logging.
    fn name(&self) -> &str;
}

/// Tokens from whitespace-separated words. Cheaper to run, rougher on
/// catalog summaries full of punctuation.
#[derive(Debug, Clone)]
pub struct WordCountEstimator {
    pub tokens_per_word: f64,
}

impl Default for WordCountEstimator {
    fn default() -> Self {
        Self {
            tokens_per_word: 1.3,
        }
    }
}

impl TokenEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let words = text.split_whitespace().count();
        (words as f64 * self.tokens_per_word).ceil() as u32
    }

    fn name(&self) -> &str {
        "word_count"
    }
}

/// Character-count based estimator (chars / chars_per_token).
#[derive(Debug, Clone)]
pub struct CharCountEstimator {
    /// Characters per token.
    pub chars_per_token: f64,
}

impl Default for CharCountEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }
}

impl TokenEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> u32 {
        if self.chars_per_token <= 0.0 {
            return 0;
        }
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u32
    }

    fn name(&self) -> &str {
        "char_count"
    }
}

/// Which [`TokenEstimator`] prices the reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Chars,
    Words,
}

/// Price list for one Tier 3 call.
///
/// `estimate` is what gets reserved before the call; `actual` is what gets
/// committed after it, from the provider's reported usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub base_cost_per_call: Decimal,
    pub input_price_per_1k_tokens: Decimal,
    pub output_price_per_1k_tokens: Decimal,
    /// Output tokens assumed when reserving
    pub expected_output_tokens: u32,
    pub estimator: EstimatorKind,
    pub chars_per_token: f64,
    pub tokens_per_word: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            base_cost_per_call: Decimal::new(1, 3),
            input_price_per_1k_tokens: Decimal::new(3, 3),
            output_price_per_1k_tokens: Decimal::new(15, 3),
            expected_output_tokens: 150,
            estimator: EstimatorKind::Chars,
            chars_per_token: 4.0,
            tokens_per_word: 1.3,
        }
    }
}

impl CostModel {
    fn count(&self, text: &str) -> u32 {
        match self.estimator {
            EstimatorKind::Chars => CharCountEstimator {
                chars_per_token: self.chars_per_token,
            }
            .estimate(text),
            EstimatorKind::Words => WordCountEstimator {
                tokens_per_word: self.tokens_per_word,
            }
            .estimate(text),
        }
    }

    fn price(tokens: u32, per_1k: Decimal) -> Decimal {
        Decimal::from(tokens) * per_1k / Decimal::ONE_THOUSAND
    }

    /// Input tokens for a request carrying `utterance` and `summary`.
    pub fn input_tokens(&self, utterance: &str, summary: &str) -> u32 {
        self.count(utterance).saturating_add(self.count(summary))
    }

    /// Amount to reserve before calling the provider.
    pub fn estimate(&self, utterance: &str, summary: &str) -> Decimal {
        self.base_cost_per_call
            + Self::price(self.input_tokens(utterance, summary), self.input_price_per_1k_tokens)
            + Self::price(self.expected_output_tokens, self.output_price_per_1k_tokens)
    }

    /// Cost of a completed call from reported usage.
    pub fn actual(&self, usage: &TokenUsage) -> Decimal {
        self.base_cost_per_call
            + Self::price(usage.input_tokens, self.input_price_per_1k_tokens)
            + Self::price(usage.output_tokens, self.output_price_per_1k_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_estimator() {
        let est = WordCountEstimator::default();
        assert_eq!(est.estimate("hello world"), 3); // 2 * 1.3 = 2.6 -> 3
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.name(), "word_count");
    }

    #[test]
    fn test_char_count_estimator() {
        let est = CharCountEstimator::default();
        assert_eq!(est.estimate("hello world"), 3); // 11 / 4 = 2.75 -> 3
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.name(), "char_count");
    }

    #[test]
    fn test_estimate_prices_input_and_expected_output() {
        let model = CostModel {
            base_cost_per_call: Decimal::new(1, 2),
            input_price_per_1k_tokens: Decimal::ONE,
            output_price_per_1k_tokens: Decimal::TWO,
            expected_output_tokens: 500,
            ..CostModel::default()
        };
        // 8 chars → 2 tokens, empty summary → 0
        let est = model.estimate("abcdefgh", "");
        assert_eq!(est, Decimal::new(1, 2) + Decimal::new(2, 3) + Decimal::ONE);
    }

    #[test]
    fn test_word_estimator_selectable() {
        let model = CostModel {
            estimator: EstimatorKind::Words,
            ..CostModel::default()
        };
        // 4 words * 1.3 = 5.2 -> 6
        assert_eq!(model.input_tokens("where do I park", ""), 6);
        let parsed: CostModel = toml::from_str("estimator = \"words\"").unwrap();
        assert_eq!(parsed.estimator, EstimatorKind::Words);
        assert_eq!(parsed.tokens_per_word, 1.3);
    }

    #[test]
    fn test_actual_uses_reported_usage() {
        let model = CostModel::default();
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 1000,
        };
        assert_eq!(model.actual(&usage), Decimal::new(19, 3));
        assert!(model.actual(&TokenUsage::default()) == model.base_cost_per_call);
    }
}
