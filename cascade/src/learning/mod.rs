//! Pattern Learning: turns Tier Three extractions into catalog improvements
//!
//! # Modules
//!
//! - [`pattern`]: LearnedPattern, payloads, identity and lifecycle
//! - [`validation`]: shape checks on provider extractions
//! - [`quality`]: the 0–100 promotion score
//! - [`review`]: manual review queue and the global registry
//! - [`pipeline`]: observation, auto-apply and promotion
//! - [`worker`]: non-blocking hand-off from the router

pub mod error;
pub mod pattern;
pub mod pipeline;
pub mod quality;
pub mod review;
pub mod validation;
pub mod worker;

pub use error::{PatternError, PatternResult};
pub use pattern::{LearnedPattern, PatternId, PatternKind, PatternPayload, PromotionState, Scope};
pub use pipeline::{IngestReport, LearningAction, PatternLearningPipeline};
pub use quality::QualityBreakdown;
pub use review::{GlobalPatternRegistry, RegistryEntry, ReviewItem, ReviewQueue};
pub use worker::{LearningHandle, LearningWorkerMetrics, DEFAULT_QUEUE_CAPACITY};
