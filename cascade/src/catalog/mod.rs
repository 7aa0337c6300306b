//! Scenario Catalog: versioned per-tenant response scenarios
//!
//! # Modules
//!
//! - [`types`]: Scenario and CatalogSnapshot
//! - [`store`]: CatalogStore collaborator trait, in-memory implementation
//! - [`cache`]: ScenarioCatalog snapshot cache used on the routing path
//! - [`apply`]: copy-on-write application of learned patterns

pub mod apply;
pub mod cache;
pub mod error;
pub mod store;
pub mod types;

pub use apply::{learned_scenario_id, ApplyOutcome};
pub use cache::{ScenarioCatalog, SharedScenarioCatalog};
pub use error::{CatalogError, CatalogResult};
pub use store::{CatalogStore, InMemoryCatalogStore};
pub use types::{CatalogSnapshot, Scenario};
