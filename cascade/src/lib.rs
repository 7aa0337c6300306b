//! Cascade - multi-tenant tiered utterance routing
//!
//! Each utterance is matched against the tenant's scenario catalog by
//! progressively more expensive tiers:
//!
//! - **Tier 1**: weighted rule match (lexical, semantic, pattern, context,
//!   urgency), free
//! - **Tier 2**: hashed-embedding similarity, free
//! - **Tier 3**: paid generative call, admitted only after the budget ledger
//!   reserves its estimated cost
//!
//! Patterns extracted by Tier 3 feed a learning pipeline that folds them back
//! into the catalog (tenant → peer group → global), so repeat traffic moves
//! down to the free tiers.
//!
//! # Usage
//!
//! ```no_run
//! # async fn demo(provider: std::sync::Arc<dyn cascade::escalation::GenerativeProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use cascade::catalog::{InMemoryCatalogStore, Scenario};
//! use cascade::config::{RouterConfig, TenantConfig};
//! use cascade::router::RouterOrchestrator;
//! use cascade::types::{CallContext, TenantId};
//!
//! let store = InMemoryCatalogStore::new().shared();
//! store.load_tenant(TenantId::from("acme"), vec![Scenario::new("hold", &["hold"], "Take your time.")])?;
//! let router = RouterOrchestrator::builder(RouterConfig::default())
//!     .catalog_store(store)
//!     .provider(provider)
//!     .build()
//!     .await?;
//! router.register_tenant(TenantConfig::new("acme")).await?;
//! let decision = router.route("hold please", &TenantId::from("acme"), CallContext::new("call-1", 0)).await?;
//! println!("{}", decision.summary());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod catalog;
pub mod config;
pub mod escalation;
pub mod events;
pub mod learning;
pub mod matcher;
pub mod router;
pub mod types;

pub use budget::{BudgetLedger, BudgetState, InMemoryBudgetStore};
pub use catalog::{CatalogSnapshot, InMemoryCatalogStore, Scenario, ScenarioCatalog};
pub use config::{RouterConfig, TenantConfig, TenantRegistry};
pub use escalation::{GenerativeProvider, HttpProvider, TierThreeEscalator};
pub use learning::{LearnedPattern, PatternLearningPipeline};
pub use matcher::{TierOneMatcher, TierTwoBooster};
pub use router::{RouterOrchestrator, RoutingError};
pub use types::{CallContext, DecisionOutcome, MatchResult, RoutingDecision, ScenarioId, TenantId, Tier};
