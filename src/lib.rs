pub mod aggregator;
pub mod analysis;
pub mod budget;
pub mod collectors;
pub mod config;
pub mod cycle;
pub mod delivery;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod status;
pub mod util;

pub use cycle::{CyclePhase, CycleState, MonitoringCycle};
pub use metrics::{CollectorResult, MetricValue, Metrics};
pub use status::HealthStatus;
