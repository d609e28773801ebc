//! Result type shared by every collector

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::HealthStatus;

/// Target name used when a whole collector failed and no target can be blamed
pub const UNNAMED_TARGET: &str = "unknown";

/// A single sampled value. Collectors decide what they report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Int(value.min(i64::MAX as u64) as i64)
    }
}

impl From<u16> for MetricValue {
    fn from(value: u16) -> Self {
        MetricValue::Int(value as i64)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => f.write_str(&group_thousands(*v)),
            MetricValue::Float(v) => write!(f, "{v:.2}"),
            MetricValue::Bool(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Insertion-ordered metric map
///
/// Order matters: renderers only show the first few entries, so collectors put
/// their most telling metric first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics(Vec<(String, MetricValue)>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a metric, keeping its original position on replace
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `k=v, k=v` for at most `max` entries, with a trailing count of the rest
    pub fn render(&self, max: usize) -> String {
        let mut rendered = self
            .iter()
            .take(max)
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");

        if self.len() > max {
            rendered.push_str(&format!(", ... ({} more)", self.len() - max));
        }
        rendered
    }
}

/// Outcome of sampling one target
///
/// Produced by collectors and never modified afterwards; the builder methods
/// consume `self` so a result is complete before anyone else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorResult {
    pub collector: String,
    pub target: String,
    pub status: HealthStatus,
    pub metrics: Metrics,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CollectorResult {
    pub fn new(
        collector: impl Into<String>,
        target: impl Into<String>,
        status: HealthStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            collector: collector.into(),
            target: target.into(),
            status,
            metrics: Metrics::new(),
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Result for a target that could not be sampled
    pub fn unknown(
        collector: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(collector, target, HealthStatus::Unknown, message).with_error(error)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name, value);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_issue(&self) -> bool {
        self.status.is_issue()
    }
}
