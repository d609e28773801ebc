//! One monitoring cycle, end to end
//!
//! ```text
//! Collecting → Aggregating → (Analyzing | SkippedAnalysis) → Formatting → Delivering → Done
//! ```
//!
//! No phase is revisited and every cycle reaches `Done`. The [`CycleState`] is
//! created at the start, filled in by each phase and handed back to the caller.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::{Aggregate, aggregate};
use crate::analysis::{Analysis, AnalysisStage};
use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::metrics::CollectorResult;
use crate::orchestrator::Orchestrator;
use crate::report::{RenderedReport, ReportFormatter, ReportInput};
use crate::status::HealthStatus;

/// Budget utilization that adds a warning to the report
pub const BUDGET_ALERT_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Collecting,
    Aggregating,
    Analyzing,
    SkippedAnalysis,
    Formatting,
    Delivering,
    Done,
}

/// Working state of one cycle
#[derive(Debug, Clone)]
pub struct CycleState {
    pub started_at: DateTime<Utc>,
    pub phase: CyclePhase,
    pub results: Vec<CollectorResult>,
    pub aggregate: Option<Aggregate>,
    pub analysis: Option<Analysis>,
    pub tokens_used: u64,
    pub soft_errors: Vec<String>,
    pub report: Option<RenderedReport>,
    pub chunks: Vec<String>,
    pub delivery: Option<DeliveryOutcome>,
    pub duration: Duration,
}

impl CycleState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            phase: CyclePhase::Collecting,
            results: Vec::new(),
            aggregate: None,
            analysis: None,
            tokens_used: 0,
            soft_errors: Vec::new(),
            report: None,
            chunks: Vec::new(),
            delivery: None,
            duration: Duration::ZERO,
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!("cycle phase {:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    pub fn issues(&self) -> &[CollectorResult] {
        self.aggregate
            .as_ref()
            .map(|a| a.issues.as_slice())
            .unwrap_or_default()
    }

    pub fn overall(&self) -> HealthStatus {
        self.aggregate
            .as_ref()
            .map(|a| a.overall)
            .unwrap_or(HealthStatus::Unknown)
    }

    pub fn report_text(&self) -> String {
        self.report.as_ref().map(RenderedReport::text).unwrap_or_default()
    }

    pub fn delivered_chunks(&self) -> usize {
        self.delivery.as_ref().map(|d| d.delivered).unwrap_or(0)
    }
}

pub struct MonitoringCycle {
    orchestrator: Orchestrator,
    analysis: AnalysisStage,
    formatter: ReportFormatter,
    deliverer: Deliverer,
}

impl MonitoringCycle {
    pub fn new(
        orchestrator: Orchestrator,
        analysis: AnalysisStage,
        formatter: ReportFormatter,
        deliverer: Deliverer,
    ) -> Self {
        Self {
            orchestrator,
            analysis,
            formatter,
            deliverer,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> CycleState {
        let start = Instant::now();
        let mut state = CycleState::new(Utc::now());

        state.results = self.orchestrator.collect().await;

        state.enter(CyclePhase::Aggregating);
        let aggregate = aggregate(&state.results);

        if aggregate.issues.is_empty() {
            state.enter(CyclePhase::SkippedAnalysis);
        } else {
            state.enter(CyclePhase::Analyzing);
            let analysis = self.analysis.analyze(&aggregate.issues).await;
            state.tokens_used += analysis.usage.total();
            state.soft_errors.extend(analysis.soft_errors.iter().cloned());
            state.analysis = Some(analysis);
            self.check_budget(&mut state).await;
        }

        state.enter(CyclePhase::Formatting);
        state.duration = start.elapsed();
        let (report, chunks) = self.formatter.render_chunks(&ReportInput {
            aggregate: &aggregate,
            analysis: state.analysis.as_ref(),
            started_at: state.started_at,
            duration: state.duration,
            tokens_used: state.tokens_used,
            soft_errors: &state.soft_errors,
        });
        state.aggregate = Some(aggregate);
        state.report = Some(report);
        state.chunks = chunks;

        state.enter(CyclePhase::Delivering);
        let outcome = self.deliverer.deliver(&state.chunks).await;
        if !outcome.is_complete() {
            error!(
                "operator received an incomplete report: {}/{} chunk(s) delivered",
                outcome.delivered, outcome.total
            );
        }
        state.delivery = Some(outcome);

        state.enter(CyclePhase::Done);
        info!(
            "cycle finished: {} ({}/{} passed), {} token(s), {}/{} chunk(s) delivered in {:.1}s",
            state.overall(),
            state.results.len() - state.issues().len(),
            state.results.len(),
            state.tokens_used,
            state.delivered_chunks(),
            state.chunks.len(),
            start.elapsed().as_secs_f64()
        );

        state
    }

    /// Run a cycle now and then on every `every` until `shutdown` resolves.
    ///
    /// The one `shutdown` future is watched both between and during runs; a
    /// run in progress when it fires is abandoned. Returns the number of
    /// cycles that finished.
    pub async fn run_until<F>(&self, every: Duration, shutdown: F) -> usize
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut finished = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    info!("shutting down after {finished} cycles");
                    return finished;
                }
            }

            tokio::select! {
                _ = self.run() => finished += 1,
                _ = &mut shutdown => {
                    warn!("shutting down, abandoning the running cycle");
                    return finished;
                }
            }
        }
    }

    async fn check_budget(&self, state: &mut CycleState) {
        let budget = self.analysis.budget();
        match budget.status().await {
            Ok(status) if status.should_alert(BUDGET_ALERT_RATIO) => {
                warn!("model budget at {:.0}% of daily limit", status.utilization_pct);
                state.soft_errors.push(format!(
                    "model budget at {:.0}% (${:.2} of ${:.2})",
                    status.utilization_pct, status.spent_today, status.daily_limit
                ));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("could not read budget status: {e}");
                state.soft_errors.push(format!("budget status unavailable: {e}"));
            }
        }
    }
}
