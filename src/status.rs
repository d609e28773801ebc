//! Traffic-light health model
//!
//! Every collector result carries a [`HealthStatus`]. The derived ordering is the
//! "worst wins" ordering used by the aggregator:
//!
//! ```text
//! Green < Unknown < Yellow < Red
//! ```
//!
//! `Unknown` sits above `Green` so that a target we could not sample is never
//! silently reported as healthy, but below `Yellow`/`Red` so that a confirmed
//! problem always dominates the overall status.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Unknown,
    Yellow,
    Red,
}

impl HealthStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            HealthStatus::Green => "🟢",
            HealthStatus::Yellow => "🟡",
            HealthStatus::Red => "🔴",
            HealthStatus::Unknown => "⚪",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Green => "GREEN",
            HealthStatus::Yellow => "YELLOW",
            HealthStatus::Red => "RED",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }

    /// Anything that is not green needs a human to look at it
    pub fn is_issue(&self) -> bool {
        *self != HealthStatus::Green
    }

    /// Worst of two statuses
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        self.max(other)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which side of a threshold is the bad one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// CPU, RAM, latency: bigger numbers are worse
    HigherIsWorse,
    /// Free disk space: smaller numbers are worse
    LowerIsWorse,
}

/// A red/yellow threshold pair for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub yellow: f64,
    pub red: f64,
    pub direction: Direction,
}

impl Threshold {
    pub fn higher_is_worse(yellow: f64, red: f64) -> Self {
        Self {
            yellow,
            red,
            direction: Direction::HigherIsWorse,
        }
    }

    pub fn lower_is_worse(yellow: f64, red: f64) -> Self {
        Self {
            yellow,
            red,
            direction: Direction::LowerIsWorse,
        }
    }

    /// Classify a value. Values exactly on a threshold take that threshold's color.
    pub fn classify(&self, value: f64) -> HealthStatus {
        if value.is_nan() {
            return HealthStatus::Unknown;
        }

        match self.direction {
            Direction::HigherIsWorse => {
                if value >= self.red {
                    HealthStatus::Red
                } else if value >= self.yellow {
                    HealthStatus::Yellow
                } else {
                    HealthStatus::Green
                }
            }
            Direction::LowerIsWorse => {
                if value <= self.red {
                    HealthStatus::Red
                } else if value <= self.yellow {
                    HealthStatus::Yellow
                } else {
                    HealthStatus::Green
                }
            }
        }
    }
}

/// Worst status across an iterator, `None` when empty
pub fn worst_of<I>(statuses: I) -> Option<HealthStatus>
where
    I: IntoIterator<Item = HealthStatus>,
{
    statuses.into_iter().max()
}
