//! Per-tenant monthly spend tracking and admission control for Tier Three.

pub mod error;
pub mod ledger;
pub mod store;
pub mod types;

pub use error::{BudgetError, BudgetResult};
pub use ledger::{BudgetLedger, DEFAULT_WARNING_RATIO};
pub use store::{BudgetStore, InMemoryBudgetStore};
pub use types::{month_start, BudgetState, Reservation, ReservationGrant, ReservationId};
