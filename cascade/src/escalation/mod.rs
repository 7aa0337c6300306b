//! Tier Three escalation.
//!
//! - [`provider`]: the generative collaborator and its HTTP client
//! - [`cost`]: reservation estimate and actual charge
//! - [`circuit_breaker`]: per-provider failure tracking
//! - [`escalator`]: admission, call, commit/release

pub mod circuit_breaker;
pub mod cost;
pub mod escalator;
pub mod provider;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use cost::{CharCountEstimator, CostModel, EstimatorKind, TokenEstimator, WordCountEstimator};
pub use escalator::{EscalationOutcome, EscalationRequest, TierThreeEscalator};
pub use provider::{
    ExtractedPattern, GenerativeProvider, HttpProvider, HttpProviderConfig, ProviderError,
    ProviderErrorKind, ProviderRequest, ProviderResponse, ProviderResult, ScenarioSummary,
    TokenUsage,
};
