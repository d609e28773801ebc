//! Collectors sample one class of infrastructure target each
//!
//! A collector is bound to its targets and thresholds when it is built and
//! exposes a single [`Collector::collect`] operation. The contract:
//!
//! 1. **One result per target** - every configured target shows up in the output
//! 2. **Isolation** - a failing target becomes an `UNKNOWN` result, its siblings
//!    are still sampled
//! 3. **No shared state** - collectors can run concurrently without coordination
//!
//! A collector that fails as a whole (returns `Err` or panics) is turned into a
//! single `UNKNOWN` result by the orchestrator.
//!
//! Every collection runs against the cycle deadline. A target that has not
//! answered by then is reported as [`TIMED_OUT_MESSAGE`] while its siblings
//! keep whatever they already produced.
//!
//! ## Registry
//!
//! The active set is built from configuration through a static table mapping the
//! collector name to its constructor. A collector without targets is skipped.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::config::{Config, DockerTarget, HostTarget, HttpTarget, TcpTarget};
use crate::metrics::CollectorResult;

pub mod docker;
pub mod host;
pub mod http;
pub mod model;
pub mod tcp;

pub const TIMED_OUT_MESSAGE: &str = "collection timed out";

#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable identifier, used to group results
    fn name(&self) -> &str;

    /// Names of the targets this collector is bound to
    fn targets(&self) -> Vec<String>;

    /// Sample every target, giving up on the ones still running at `deadline`
    async fn collect(&self, deadline: Instant) -> anyhow::Result<Vec<CollectorResult>>;
}

type Constructor = fn(&Config) -> Option<Box<dyn Collector>>;

/// Every collector the monitor knows about, by name
pub const REGISTRY: &[(&str, Constructor)] = &[
    (http::NAME, http::HttpCollector::from_config),
    (tcp::NAME, tcp::TcpCollector::from_config),
    (host::NAME, host::HostCollector::from_config),
    (docker::NAME, docker::DockerCollector::from_config),
    (model::NAME, model::ModelCollector::from_config),
];

/// Build the active collector set for a configuration
pub fn from_config(config: &Config) -> Vec<Arc<dyn Collector>> {
    REGISTRY
        .iter()
        .filter_map(|(name, constructor)| {
            let collector = constructor(config);
            match &collector {
                Some(c) => debug!("registered {name} collector with {} target(s)", c.targets().len()),
                None => debug!("no targets for {name} collector, skipping"),
            }
            collector.map(|c| -> Arc<dyn Collector> { Arc::from(c) })
        })
        .collect()
}

/// Anything that names a collection target
pub trait TargetName {
    fn target_name(&self) -> &str;
}

impl TargetName for HttpTarget {
    fn target_name(&self) -> &str {
        &self.name
    }
}

impl TargetName for TcpTarget {
    fn target_name(&self) -> &str {
        &self.name
    }
}

impl TargetName for HostTarget {
    fn target_name(&self) -> &str {
        &self.name
    }
}

impl TargetName for DockerTarget {
    fn target_name(&self) -> &str {
        &self.name
    }
}

/// Result for a target that missed the cycle deadline
pub fn timed_out(collector: &str, target: &str) -> CollectorResult {
    CollectorResult::unknown(
        collector,
        target,
        TIMED_OUT_MESSAGE,
        "no result before the cycle deadline",
    )
}

/// Run `check` for every target concurrently
///
/// Errors and panics inside one check are converted into an `UNKNOWN` result for
/// that target only. A check still running at `deadline` is dropped and its
/// target reported as timed out.
pub async fn collect_each<'a, T, F, Fut>(
    collector: &str,
    targets: &'a [T],
    deadline: Instant,
    check: F,
) -> Vec<CollectorResult>
where
    T: TargetName,
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = anyhow::Result<CollectorResult>>,
{
    let checks = targets.iter().map(|target| {
        let check = timeout_at(deadline, AssertUnwindSafe(check(target)).catch_unwind());
        async move {
            let target_name = target.target_name();
            match check.await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(e))) => {
                    warn!("{collector}/{target_name}: check failed: {e:#}");
                    CollectorResult::unknown(
                        collector,
                        target_name,
                        format!("Check failed: {e}"),
                        format!("{e:#}"),
                    )
                }
                Ok(Err(panic)) => {
                    let reason = panic_message(panic.as_ref());
                    warn!("{collector}/{target_name}: check panicked: {reason}");
                    CollectorResult::unknown(
                        collector,
                        target_name,
                        format!("Check crashed: {reason}"),
                        reason,
                    )
                }
                Err(_) => {
                    warn!("{collector}/{target_name}: no result before the cycle deadline");
                    timed_out(collector, target_name)
                }
            }
        }
    });

    join_all(checks).await
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
