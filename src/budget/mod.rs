//! Persistent daily budget for the explanatory model
//!
//! - [`BudgetStore`] persists one [`BudgetState`] record (file or memory)
//! - [`BudgetTracker`] gates calls with `can_afford` and books actual cost with
//!   `record_usage`, resetting at the UTC day boundary
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use infra_monitoring::budget::{BudgetTracker, FileBudgetStore, PriceTable};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(FileBudgetStore::new("./budget_state.json"));
//! let tracker = BudgetTracker::new(store, 3.0, PriceTable::default());
//!
//! if tracker.can_afford(tracker.estimate_cost(8000)).await {
//!     // call the model, then
//!     tracker.record_usage(1200, 400).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod store;
pub mod tracker;

pub use error::{BudgetError, BudgetResult};
pub use store::{BudgetState, BudgetStore, FileBudgetStore, MemoryBudgetStore};
pub use tracker::{BudgetPhase, BudgetStatus, BudgetTracker, PriceTable};
