//! Routing façade.
//!
//! - [`orchestrator`]: RouterOrchestrator and its builder
//! - [`error`]: the two conditions `route` surfaces as errors

pub mod error;
pub mod orchestrator;

pub use error::{RoutingError, RoutingErrorKind, RoutingResult};
pub use orchestrator::{RouterBuilder, RouterOrchestrator, SharedRouter, SIGNAL_ERROR, SIGNAL_TIMEOUT};
