//! Concurrent, failure-isolated collection for one cycle
//!
//! ## Task Group
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ Orchestrator │ deadline = now + cycle_timeout
//!                 └──────┬───────┘
//!          spawn         │         spawn
//!      ┌─────────────────┼─────────────────┐
//!      ▼                 ▼                 ▼
//!  Collector-1       Collector-2  ...  Collector-N
//!      │                 │                 │
//!      └──── Ok / Err / panic / timeout ───┘
//!                        │
//!                 flat Vec<CollectorResult>
//! ```
//!
//! - `Ok(results)` is used as is
//! - `Err` or a panic becomes one `UNKNOWN` result for target [`UNNAMED_TARGET`]
//! - each collector receives the deadline and reports its own late targets as
//!   `UNKNOWN` with message "collection timed out", keeping the finished ones
//! - a collector that ignores the deadline is aborted shortly after it, and every
//!   target of that collector becomes "collection timed out"
//!
//! Output order follows registration order, independent of completion order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, instrument, warn};

use crate::collectors::{Collector, panic_message};
use crate::metrics::{CollectorResult, UNNAMED_TARGET};

pub use crate::collectors::TIMED_OUT_MESSAGE;

/// Time a collector gets past the deadline to hand in its partial results
const ABORT_GRACE: Duration = Duration::from_millis(500);

/// Runs every registered collector once
#[derive(Clone)]
pub struct Orchestrator {
    collectors: Vec<Arc<dyn Collector>>,
    cycle_timeout: Duration,
}

/// How one collector task ended
enum Outcome {
    Finished(Vec<CollectorResult>),
    Failed(String),
}

impl Orchestrator {
    pub fn new(collectors: Vec<Arc<dyn Collector>>, cycle_timeout: Duration) -> Self {
        Self {
            collectors,
            cycle_timeout,
        }
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    /// Collect from every collector concurrently, bounded by the cycle timeout
    #[instrument(skip(self), fields(collectors = self.collectors.len()))]
    pub async fn collect(&self) -> Vec<CollectorResult> {
        let deadline = Instant::now() + self.cycle_timeout;
        let abort_at = deadline + ABORT_GRACE;
        let mut tasks = JoinSet::new();

        for (index, collector) in self.collectors.iter().enumerate() {
            let collector = Arc::clone(collector);
            tasks.spawn(async move {
                let outcome = match AssertUnwindSafe(collector.collect(deadline)).catch_unwind().await {
                    Ok(Ok(results)) => Outcome::Finished(results),
                    Ok(Err(e)) => Outcome::Failed(format!("{e:#}")),
                    Err(panic) => Outcome::Failed(panic_message(panic.as_ref())),
                };
                (index, outcome)
            });
        }

        let mut finished: Vec<Option<Vec<CollectorResult>>> = vec![None; self.collectors.len()];

        loop {
            match timeout_at(abort_at, tasks.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => {
                    let name = self.collectors[index].name();
                    let results = match outcome {
                        Outcome::Finished(results) => {
                            debug!("{name}: collected {} result(s)", results.len());
                            results
                        }
                        Outcome::Failed(reason) => {
                            error!("{name}: collector failed: {reason}");
                            vec![CollectorResult::unknown(
                                name,
                                UNNAMED_TARGET,
                                format!("Collection error: {reason}"),
                                reason,
                            )]
                        }
                    };
                    finished[index] = Some(results);
                }
                Ok(Some(Err(e))) => {
                    // tasks are only cancelled below, after the loop
                    error!("collector task ended unexpectedly: {e}");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "cycle timeout of {:?} elapsed with {} collector(s) still running",
                        self.cycle_timeout,
                        tasks.len()
                    );
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        finished
            .into_iter()
            .enumerate()
            .flat_map(|(index, results)| {
                results.unwrap_or_else(|| self.timed_out(self.collectors[index].as_ref()))
            })
            .collect()
    }

    fn timed_out(&self, collector: &dyn Collector) -> Vec<CollectorResult> {
        let mut targets = collector.targets();
        if targets.is_empty() {
            targets.push(UNNAMED_TARGET.to_string());
        }

        targets
            .into_iter()
            .map(|target| {
                CollectorResult::unknown(
                    collector.name(),
                    target,
                    TIMED_OUT_MESSAGE,
                    format!("no result within {:?}", self.cycle_timeout),
                )
            })
            .collect()
    }
}
