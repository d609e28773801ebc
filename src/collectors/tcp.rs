//! Database reachability via TCP connect

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{instrument, trace};

use crate::config::{Config, TcpTarget, Thresholds};
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

use super::{Collector, collect_each};

pub const NAME: &str = "database";

pub struct TcpCollector {
    targets: Vec<TcpTarget>,
    thresholds: Thresholds,
}

impl TcpCollector {
    pub fn new(targets: Vec<TcpTarget>, thresholds: Thresholds) -> Self {
        Self {
            targets,
            thresholds,
        }
    }

    pub fn from_config(config: &Config) -> Option<Box<dyn Collector>> {
        if config.targets.tcp.is_empty() {
            return None;
        }
        Some(Box::new(Self::new(
            config.targets.tcp.clone(),
            config.thresholds.clone(),
        )))
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    async fn check_reachable(&self, target: &TcpTarget) -> Result<CollectorResult> {
        let address = format!("{}:{}", target.host, target.port);
        trace!("connecting to {address}");

        let start = Instant::now();
        let attempt = timeout(
            Duration::from_millis(target.timeout_ms),
            TcpStream::connect(&address),
        )
        .await;
        let connect_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = match attempt {
            Ok(Ok(_stream)) => {
                let status = if connect_ms >= self.thresholds.api_slow_ms as f64 {
                    HealthStatus::Yellow
                } else {
                    HealthStatus::Green
                };
                let message = match status {
                    HealthStatus::Yellow => format!("Slow connect ({connect_ms:.0}ms)"),
                    _ => format!("Reachable ({connect_ms:.0}ms)"),
                };
                CollectorResult::new(NAME, &target.name, status, message)
                    .with_metric("connect_ms", connect_ms)
                    .with_metric("address", address)
            }
            Ok(Err(e)) => CollectorResult::new(
                NAME,
                &target.name,
                HealthStatus::Red,
                format!("Connection failed: {e}"),
            )
            .with_metric("address", address)
            .with_error(e.to_string()),
            Err(_) => CollectorResult::new(
                NAME,
                &target.name,
                HealthStatus::Red,
                format!("Connection timeout after {}ms", target.timeout_ms),
            )
            .with_metric("address", address)
            .with_error("connect timed out"),
        };

        Ok(result)
    }
}

#[async_trait]
impl Collector for TcpCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    async fn collect(&self, deadline: Instant) -> Result<Vec<CollectorResult>> {
        Ok(collect_each(NAME, &self.targets, deadline, |target| self.check_reachable(target)).await)
    }
}
