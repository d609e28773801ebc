//! Endpoint latency checks
//!
//! ```text
//! GET url → status code → response time → GREEN / YELLOW / RED
//! ```
//!
//! - non-200 status → RED `HTTP <code>`
//! - slower than `api_timeout_ms` → RED, slower than `api_slow_ms` → YELLOW
//! - request timeout or connection error → RED

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{instrument, trace};

use crate::config::{Config, HttpTarget, Thresholds};
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

use super::{Collector, collect_each};

pub const NAME: &str = "http";

pub struct HttpCollector {
    targets: Vec<HttpTarget>,
    thresholds: Thresholds,
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn new(targets: Vec<HttpTarget>, thresholds: Thresholds) -> Self {
        Self {
            targets,
            thresholds,
            client: reqwest::Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    pub fn from_config(config: &Config) -> Option<Box<dyn Collector>> {
        if config.targets.http.is_empty() {
            return None;
        }
        Some(Box::new(Self::new(
            config.targets.http.clone(),
            config.thresholds.clone(),
        )))
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    async fn check_endpoint(&self, target: &HttpTarget) -> Result<CollectorResult> {
        trace!("checking endpoint at {}", target.url);

        let start = Instant::now();
        let response = self
            .client
            .get(&target.url)
            .timeout(Duration::from_millis(target.timeout_ms))
            .send()
            .await;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let (status, message) = self.evaluate(status_code, response_time_ms);

                CollectorResult::new(NAME, &target.name, status, message)
                    .with_metric("status_code", status_code)
                    .with_metric("response_time_ms", response_time_ms)
                    .with_metric("url", target.url.as_str())
            }
            Err(e) if e.is_timeout() => {
                CollectorResult::new(NAME, &target.name, HealthStatus::Red, "Request timeout")
                    .with_metric("url", target.url.as_str())
                    .with_error(e.to_string())
            }
            Err(e) => CollectorResult::new(
                NAME,
                &target.name,
                HealthStatus::Red,
                format!("Request error: {e}"),
            )
            .with_metric("url", target.url.as_str())
            .with_error(e.to_string()),
        };

        Ok(result)
    }

    fn evaluate(&self, status_code: u16, response_time_ms: f64) -> (HealthStatus, String) {
        if status_code != 200 {
            return (HealthStatus::Red, format!("HTTP {status_code}"));
        }

        match self.thresholds.latency().classify(response_time_ms) {
            HealthStatus::Red => (HealthStatus::Red, format!("Timeout ({response_time_ms:.0}ms)")),
            HealthStatus::Yellow => (HealthStatus::Yellow, format!("Slow ({response_time_ms:.0}ms)")),
            status => (status, format!("OK ({response_time_ms:.0}ms)")),
        }
    }
}

#[async_trait]
impl Collector for HttpCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    async fn collect(&self, deadline: Instant) -> Result<Vec<CollectorResult>> {
        Ok(collect_each(NAME, &self.targets, deadline, |target| self.check_endpoint(target)).await)
    }
}
