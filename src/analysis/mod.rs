//! Explanation of detected issues by a language model
//!
//! ```text
//!  issues ──▶ budget gate ──(exhausted)──────────────────────────▶ synthetic result
//!                 │
//!                 ▼
//!            build prompt ──▶ invoke (retry) ──(failed)──────────▶ synthetic result
//!                                   │
//!                                   ▼
//!                            record usage ──▶ parse ──(malformed)─▶ fallback result
//!                                                │
//!                                                ▼
//!                                          parsed analysis
//! ```
//!
//! Every path ends in an [`Analysis`]; nothing in here fails the cycle. Usage is
//! booked as soon as the model answered, whether or not the answer parses.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::budget::BudgetTracker;
use crate::metrics::CollectorResult;
use crate::retry::RetryPolicy;

pub mod client;
pub mod parser;
pub mod prompt;

pub use client::MessagesClient;

pub const PARSE_FAILED_ROOT_CAUSE: &str = "analysis parsing failed";
pub const BUDGET_EXHAUSTED_ROOT_CAUSE: &str = "budget exhausted - analysis skipped";
pub const MANUAL_INVESTIGATION: &str = "manual investigation required";

/// Failure signals of the model API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("model throttled: {0}")]
    Throttled(String),
    #[error("invalid model request: {0}")]
    InvalidRequest(String),

    #[error("model not found: {0}")]
    NotFound(String),
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Throttled(_) | ModelError::Unavailable(_) | ModelError::Transport(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A model that explains issues
#[async_trait]
pub trait ExplanatoryModel: Send + Sync {
    async fn invoke(&self, prompt: &str, system: Option<&str>) -> Result<ModelResponse, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub rationale: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_action() -> String {
    "No action specified".to_string()
}

impl Recommendation {
    pub fn new(priority: &str, action: &str, rationale: &str) -> Self {
        Self {
            priority: priority.to_string(),
            action: action.to_string(),
            rationale: rationale.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// How an analysis came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    /// Parsed from a model response
    Model,
    /// Model answered but the answer could not be parsed
    ParseFailed,
    /// Skipped by the budget gate
    BudgetExhausted,
    /// Model could not be reached after retries
    Unavailable,
    /// Nothing to analyze
    NoIssues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub root_cause: String,
    pub severity: String,
    pub affected_systems: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub usage: TokenUsage,
    pub source: AnalysisSource,
    /// Problems that did not stop the analysis but should be reported
    pub soft_errors: Vec<String>,
}

impl Analysis {
    fn synthetic(source: AnalysisSource, root_cause: String, affected: Vec<String>) -> Self {
        Self {
            root_cause,
            severity: "unknown".to_string(),
            affected_systems: affected,
            recommendations: Vec::new(),
            usage: TokenUsage::default(),
            source,
            soft_errors: Vec::new(),
        }
    }

    pub fn no_issues() -> Self {
        Self {
            severity: "none".to_string(),
            ..Self::synthetic(AnalysisSource::NoIssues, "No issues detected".to_string(), vec![])
        }
    }

    pub fn budget_exhausted(issues: &[CollectorResult]) -> Self {
        let mut analysis = Self::synthetic(
            AnalysisSource::BudgetExhausted,
            BUDGET_EXHAUSTED_ROOT_CAUSE.to_string(),
            affected_targets(issues),
        );
        analysis.recommendations.push(Recommendation::new(
            "high",
            "Review the issues manually or raise the daily model budget",
            "Automated analysis was skipped because today's budget is used up",
        ));
        analysis
    }

    pub fn unavailable(issues: &[CollectorResult], error: &ModelError) -> Self {
        let mut analysis = Self::synthetic(
            AnalysisSource::Unavailable,
            format!("analysis unavailable: {error}"),
            affected_targets(issues),
        );
        analysis.recommendations.push(Recommendation::new(
            "high",
            MANUAL_INVESTIGATION,
            "Automated analysis failed",
        ));
        analysis.soft_errors.push(error.to_string());
        analysis
    }

    pub fn parse_failed(usage: TokenUsage, reason: String) -> Self {
        let mut analysis =
            Self::synthetic(AnalysisSource::ParseFailed, PARSE_FAILED_ROOT_CAUSE.to_string(), vec![]);
        analysis.usage = usage;
        analysis.recommendations.push(Recommendation::new(
            "high",
            MANUAL_INVESTIGATION,
            "Automated analysis parsing failed",
        ));
        analysis.soft_errors.push(reason);
        analysis
    }

    /// Whether a model call was made for this analysis
    pub fn called_model(&self) -> bool {
        matches!(self.source, AnalysisSource::Model | AnalysisSource::ParseFailed)
    }
}

fn affected_targets(issues: &[CollectorResult]) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for issue in issues {
        if !targets.contains(&issue.target) {
            targets.push(issue.target.clone());
        }
    }
    targets
}

/// Budget-gated root cause analysis
pub struct AnalysisStage {
    model: Arc<dyn ExplanatoryModel>,
    budget: BudgetTracker,
    retry: RetryPolicy,
    estimated_tokens: u64,
}

impl AnalysisStage {
    pub fn new(
        model: Arc<dyn ExplanatoryModel>,
        budget: BudgetTracker,
        retry: RetryPolicy,
        estimated_tokens: u64,
    ) -> Self {
        Self {
            model,
            budget,
            retry,
            estimated_tokens,
        }
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    #[instrument(skip(self, issues), fields(issues = issues.len()))]
    pub async fn analyze(&self, issues: &[CollectorResult]) -> Analysis {
        if issues.is_empty() {
            info!("no issues to analyze");
            return Analysis::no_issues();
        }

        let estimate = self.budget.estimate_cost(self.estimated_tokens);
        if !self.budget.can_afford(estimate).await {
            warn!("budget exhausted, skipping analysis of {} issue(s)", issues.len());
            return Analysis::budget_exhausted(issues);
        }

        let prompt = prompt::build_prompt(issues);
        info!("analyzing {} issue(s)", issues.len());

        let response = match self
            .retry
            .run(
                || self.model.invoke(&prompt, Some(prompt::SYSTEM_PROMPT)),
                ModelError::is_retryable,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("analysis failed: {e}");
                return Analysis::unavailable(issues, &e);
            }
        };

        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        };

        let mut soft_errors = Vec::new();
        if let Err(e) = self
            .budget
            .record_usage(usage.input_tokens, usage.output_tokens)
            .await
        {
            error!("failed to record model usage: {e}");
            soft_errors.push(format!("budget record failed: {e}"));
        }

        let mut analysis = match parser::parse_analysis(&response.text) {
            Ok(parsed) => {
                info!(
                    "analysis completed: {} severity, {} recommendation(s)",
                    parsed.severity,
                    parsed.recommendations.len()
                );
                Analysis {
                    root_cause: parsed.root_cause,
                    severity: parsed.severity,
                    affected_systems: parsed.affected_systems,
                    recommendations: parsed.recommendations,
                    usage,
                    source: AnalysisSource::Model,
                    soft_errors: Vec::new(),
                }
            }
            Err(e) => {
                let preview: String = response.text.chars().take(500).collect();
                error!("failed to parse analysis response: {e}");
                debug!("response text: {preview}");
                Analysis::parse_failed(usage, e.to_string())
            }
        };

        analysis.soft_errors.extend(soft_errors);
        analysis
    }
}
