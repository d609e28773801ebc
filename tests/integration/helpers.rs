//! Helper types for integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::Instant;
use infra_monitoring::{
    analysis::{AnalysisStage, ExplanatoryModel, ModelError, ModelResponse},
    budget::{BudgetStore, BudgetTracker, PriceTable},
    collectors::Collector,
    cycle::MonitoringCycle,
    delivery::{Deliverer, MessageFormat, NotificationChannel, SendError},
    metrics::CollectorResult,
    orchestrator::Orchestrator,
    report::ReportFormatter,
    retry::RetryPolicy,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()
}

/// Collector returning a fixed set of results
pub struct StaticCollector {
    pub name: &'static str,
    pub results: Vec<CollectorResult>,
}

impl StaticCollector {
    pub fn new(name: &'static str, results: Vec<CollectorResult>) -> Arc<Self> {
        Arc::new(Self { name, results })
    }
}

#[async_trait]
impl Collector for StaticCollector {
    fn name(&self) -> &str {
        self.name
    }

    fn targets(&self) -> Vec<String> {
        self.results.iter().map(|r| r.target.clone()).collect()
    }

    async fn collect(&self, _deadline: Instant) -> anyhow::Result<Vec<CollectorResult>> {
        Ok(self.results.clone())
    }
}

/// Model answering every call with the same text
pub struct CannedModel {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    calls: Mutex<u32>,
}

impl CannedModel {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            input_tokens: 2000,
            output_tokens: 400,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ExplanatoryModel for CannedModel {
    async fn invoke(&self, _prompt: &str, _system: Option<&str>) -> Result<ModelResponse, ModelError> {
        *self.calls.lock().unwrap() += 1;
        Ok(ModelResponse {
            text: self.text.clone(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        })
    }
}

/// Channel recording every send; chunks whose text contains `fail_on` fail
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, MessageFormat)>>,
    fail_on: Option<String>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_on: None,
        })
    }

    /// Markdown is rejected and plain text times out for matching chunks
    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_on: Some(marker.to_string()),
        })
    }

    pub fn sent(&self) -> Vec<(String, MessageFormat)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(text, _)| text).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), SendError> {
        self.sent.lock().unwrap().push((text.to_string(), format));

        match &self.fail_on {
            Some(marker) if text.contains(marker.as_str()) => match format {
                MessageFormat::Markdown => Err(SendError::FormattingRejected(
                    "can't parse entities".to_string(),
                )),
                MessageFormat::Plain => Err(SendError::Transient("timed out".to_string())),
            },
            _ => Ok(()),
        }
    }
}

pub struct CycleParts {
    pub collectors: Vec<Arc<dyn Collector>>,
    pub model: Arc<dyn ExplanatoryModel>,
    pub store: Arc<dyn BudgetStore>,
    pub channel: Arc<dyn NotificationChannel>,
    pub daily_limit: f64,
    pub max_chunk_chars: usize,
}

pub fn build_cycle(parts: CycleParts) -> MonitoringCycle {
    let budget = BudgetTracker::new(parts.store, parts.daily_limit, PriceTable::default())
        .with_clock(today);

    MonitoringCycle::new(
        Orchestrator::new(parts.collectors, Duration::from_secs(5)),
        AnalysisStage::new(parts.model, budget, RetryPolicy::immediate(3), 8000),
        ReportFormatter::new(parts.max_chunk_chars),
        Deliverer::new(parts.channel, RetryPolicy::immediate(3), Duration::ZERO),
    )
}

pub const ANALYSIS_JSON: &str = r#"Here is what I found:

```json
{
  "root_cause": "Application logs are not rotated and filled the root volume",
  "severity": "high",
  "affected_systems": ["web-1"],
  "recommendations": [
    {
      "priority": "immediate",
      "action": "Enable logrotate for /var/log/app",
      "rationale": "Frees disk space and prevents recurrence"
    }
  ]
}
```"#;
