//! Daily spend accounting for the explanatory model
//!
//! ```text
//!               record_usage (spent >= limit)
//!  WithinBudget ─────────────────────────────▶ Exhausted
//!       ▲                                          │
//!       └──────────── new UTC day (spent = 0) ─────┘
//! ```
//!
//! Every operation runs "load, roll over if stale, compare/add, persist" as one
//! [`BudgetStore::update`], so the lock belongs to the store. Overlapping cycles,
//! separate trackers and (for the file store) separate processes never lose an
//! update or reset twice.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, instrument, warn};

use super::error::BudgetResult;
use super::store::{BudgetState, BudgetStore, Transition};

/// USD per million tokens, input and output priced independently
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTable {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            input_per_million: 0.80,
            output_per_million: 4.00,
        }
    }
}

impl PriceTable {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1_000_000.0 * self.input_per_million
            + output_tokens as f64 / 1_000_000.0 * self.output_per_million
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPhase {
    WithinBudget,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetStatus {
    pub daily_limit: f64,
    pub spent_today: f64,
    pub remaining: f64,
    pub utilization_pct: f64,
    pub phase: BudgetPhase,
}

impl BudgetStatus {
    /// Whether today's spend reached `ratio` of the limit
    pub fn should_alert(&self, ratio: f64) -> bool {
        self.spent_today >= self.daily_limit * ratio
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Gatekeeper for model spend, shared across cycles
#[derive(Clone)]
pub struct BudgetTracker {
    store: Arc<dyn BudgetStore>,
    daily_limit: f64,
    prices: PriceTable,
    today: Clock,
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn BudgetStore>, daily_limit: f64, prices: PriceTable) -> Self {
        Self {
            store,
            daily_limit,
            prices,
            today: Arc::new(|| Utc::now().date_naive()),
        }
    }

    /// Replace the UTC clock, mainly to simulate a day rollover
    pub fn with_clock<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Arc::new(today);
        self
    }

    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    pub fn prices(&self) -> PriceTable {
        self.prices
    }

    /// Cost of a call using `total_tokens`, assuming an even input/output split
    pub fn estimate_cost(&self, total_tokens: u64) -> f64 {
        let half = total_tokens / 2;
        self.prices.cost(half, half)
    }

    /// Today's view of a stored record. One from an earlier day is reset to
    /// zero and marked for writing.
    fn today_state(&self, stored: Option<BudgetState>) -> Transition {
        let today = (self.today)();

        match stored {
            Some(state) if state.date == today => Transition::Keep(BudgetState {
                daily_limit: self.daily_limit,
                ..state
            }),
            Some(state) => {
                info!("new day detected ({} -> {today}), resetting budget", state.date);
                Transition::Write(BudgetState::fresh(today, self.daily_limit))
            }
            None => Transition::Keep(BudgetState::fresh(today, self.daily_limit)),
        }
    }

    async fn current(&self) -> BudgetResult<BudgetState> {
        self.store
            .update(Box::new(|stored| self.today_state(stored)))
            .await
    }

    /// Whether a call costing `estimated_cost` fits into today's budget
    ///
    /// True iff `spent + estimated_cost < daily_limit`. A store failure answers
    /// false: no spend without accounting.
    #[instrument(skip(self))]
    pub async fn can_afford(&self, estimated_cost: f64) -> bool {
        match self.current().await {
            Ok(state) => {
                let affordable = state.spent + estimated_cost < self.daily_limit;
                if !affordable {
                    warn!(
                        "budget exceeded: ${:.4} + ${estimated_cost:.4} >= ${:.2}",
                        state.spent, self.daily_limit
                    );
                }
                affordable
            }
            Err(e) => {
                error!("could not read budget state, refusing spend: {e}");
                false
            }
        }
    }

    /// Add the cost of a finished call to today's spend and persist it
    /// immediately. Returns the cost of this call.
    #[instrument(skip(self))]
    pub async fn record_usage(&self, input_tokens: u64, output_tokens: u64) -> BudgetResult<f64> {
        let cost = self.prices.cost(input_tokens, output_tokens);

        let state = self
            .store
            .update(Box::new(|stored| {
                let state = self.today_state(stored).into_state();
                Transition::Write(BudgetState {
                    spent: state.spent + cost,
                    ..state
                })
            }))
            .await?;

        info!(
            "recorded model usage: {input_tokens} in, {output_tokens} out = ${cost:.4} (total today: ${:.4}/{:.2})",
            state.spent, self.daily_limit
        );
        Ok(cost)
    }

    pub async fn status(&self) -> BudgetResult<BudgetStatus> {
        let state = self.current().await?;

        let utilization_pct = if self.daily_limit > 0.0 {
            state.spent / self.daily_limit * 100.0
        } else {
            0.0
        };

        Ok(BudgetStatus {
            daily_limit: self.daily_limit,
            spent_today: state.spent,
            remaining: (self.daily_limit - state.spent).max(0.0),
            utilization_pct,
            phase: if state.spent >= self.daily_limit {
                BudgetPhase::Exhausted
            } else {
                BudgetPhase::WithinBudget
            },
        })
    }
}
