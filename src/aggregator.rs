//! Pure aggregation of one cycle's results

use std::collections::BTreeMap;

use crate::metrics::CollectorResult;
use crate::status::{HealthStatus, worst_of};

/// Roll-up of all results of one collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSummary {
    pub worst: HealthStatus,
    pub passed: usize,
    pub total: usize,
}

/// Everything the later stages need to know about the collected results
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Worst status across all results, `Unknown` when nothing was collected
    pub overall: HealthStatus,
    /// Non-green results, in collection order
    pub issues: Vec<CollectorResult>,
    pub passed: usize,
    pub total: usize,
    pub red: usize,
    pub yellow: usize,
    pub unknown: usize,
    /// Keyed by collector name, sorted for stable rendering
    pub by_collector: BTreeMap<String, CollectorSummary>,
}

impl Aggregate {
    pub fn is_healthy(&self) -> bool {
        self.total > 0 && self.issues.is_empty()
    }
}

pub fn aggregate(results: &[CollectorResult]) -> Aggregate {
    let overall = worst_of(results.iter().map(|r| r.status)).unwrap_or(HealthStatus::Unknown);

    let issues: Vec<CollectorResult> = results.iter().filter(|r| r.is_issue()).cloned().collect();

    let count = |status: HealthStatus| results.iter().filter(|r| r.status == status).count();

    let mut by_collector: BTreeMap<String, CollectorSummary> = BTreeMap::new();
    for result in results {
        let summary = by_collector
            .entry(result.collector.clone())
            .or_insert(CollectorSummary {
                worst: HealthStatus::Green,
                passed: 0,
                total: 0,
            });
        summary.worst = summary.worst.worst(result.status);
        summary.total += 1;
        if !result.is_issue() {
            summary.passed += 1;
        }
    }

    Aggregate {
        overall,
        passed: results.len() - issues.len(),
        total: results.len(),
        red: count(HealthStatus::Red),
        yellow: count(HealthStatus::Yellow),
        unknown: count(HealthStatus::Unknown),
        issues,
        by_collector,
    }
}
