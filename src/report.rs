//! Human-readable cycle report and its delivery chunks
//!
//! A report is a list of sections, joined by a single newline:
//!
//! 1. header and per-collector summary (always)
//! 2. issue details, worst first (only with issues)
//! 3. analysis and recommendations (only when analysis ran)
//! 4. footer with duration, tokens and soft errors (always)
//!
//! Rendering is a pure function of its input, so the text is stable enough for
//! snapshot tests. The output uses Telegram's legacy Markdown (`*bold*`).
//!
//! ## Chunking
//!
//! Chunks are contiguous slices of the report text: concatenated in order they
//! reproduce it exactly. A chunk boundary always falls right after a line break,
//! except inside a single line longer than the chunk limit, which is cut at a
//! character boundary. When the report does not fit into one chunk, the first
//! section gets its own chunk(s) so the overall status arrives even if later
//! chunks fail.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::aggregator::Aggregate;
use crate::analysis::Analysis;
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

/// Leaves headroom under Telegram's 4096 character message limit
pub const MAX_CHUNK_CHARS: usize = 4000;

/// Metrics shown per issue
pub const MAX_REPORT_METRICS: usize = 3;

/// Affected systems listed before "... and N more"
pub const MAX_AFFECTED_SYSTEMS: usize = 5;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━";

/// Everything a report is rendered from
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub aggregate: &'a Aggregate,
    pub analysis: Option<&'a Analysis>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub tokens_used: u64,
    pub soft_errors: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub sections: Vec<String>,
}

impl RenderedReport {
    pub fn text(&self) -> String {
        self.sections.join("\n")
    }

    /// Split into chunks of at most `max_chars` characters
    pub fn chunks(&self, max_chars: usize) -> Vec<String> {
        let max_chars = max_chars.max(1);
        let text = self.text();
        if text.chars().count() <= max_chars {
            return vec![text];
        }

        let Some((head, tail)) = self.sections.split_first() else {
            return Vec::new();
        };

        let mut head = head.clone();
        if !tail.is_empty() {
            head.push('\n');
        }

        let mut chunks = split_lines(&head, max_chars);
        chunks.extend(split_lines(&tail.join("\n"), max_chars));
        chunks
    }
}

/// Greedily pack whole lines (with their line breaks) into chunks
pub fn split_lines(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let len = line.chars().count();

        if current_len + len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if len <= max_chars {
            current.push_str(line);
            current_len += len;
            continue;
        }

        // overlong line, cut at character boundaries
        let mut chars = line.chars();
        loop {
            let piece: String = chars.by_ref().take(max_chars).collect();
            let piece_len = piece.chars().count();
            if piece_len == 0 {
                break;
            }
            if piece_len == max_chars {
                chunks.push(piece);
            } else {
                current = piece;
                current_len = piece_len;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn overall_label(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Green => "Healthy",
        HealthStatus::Yellow => "Warnings",
        HealthStatus::Red => "Critical Issues",
        HealthStatus::Unknown => "Unknown",
    }
}

fn priority_emoji(priority: &str) -> &'static str {
    match priority {
        "IMMEDIATE" => "🔥",
        "HIGH" => "⚠️",
        "LOW" => "💡",
        _ => "ℹ️",
    }
}

#[derive(Debug, Clone)]
pub struct ReportFormatter {
    max_chunk_chars: usize,
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(MAX_CHUNK_CHARS)
    }
}

impl ReportFormatter {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self { max_chunk_chars }
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    pub fn render(&self, input: &ReportInput<'_>) -> RenderedReport {
        let mut sections = vec![self.header(input)];

        if !input.aggregate.issues.is_empty() {
            sections.push(self.issues(&input.aggregate.issues));
        }
        if let Some(analysis) = input.analysis {
            sections.push(self.analysis(analysis));
        }
        sections.push(self.footer(input));

        RenderedReport { sections }
    }

    /// Render and split in one go
    pub fn render_chunks(&self, input: &ReportInput<'_>) -> (RenderedReport, Vec<String>) {
        let report = self.render(input);
        let chunks = report.chunks(self.max_chunk_chars);
        (report, chunks)
    }

    fn header(&self, input: &ReportInput<'_>) -> String {
        let aggregate = input.aggregate;
        let mut lines = vec![
            format!("{} *Infrastructure Health Report*", aggregate.overall.emoji()),
            format!("📅 {}", input.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
            String::new(),
            format!("📊 *Overall Status*: {}", overall_label(aggregate.overall)),
            format!("✅ {}/{} checks passed", aggregate.passed, aggregate.total),
        ];

        if aggregate.red > 0 {
            lines.push(format!("🔴 {} critical issue(s)", aggregate.red));
        }
        if aggregate.yellow > 0 {
            lines.push(format!("🟡 {} warning(s)", aggregate.yellow));
        }
        if aggregate.unknown > 0 {
            lines.push(format!("⚪ {} unknown", aggregate.unknown));
        }

        lines.push(RULE.to_string());
        lines.push("📦 *Summary by Type*".to_string());
        for (collector, summary) in &aggregate.by_collector {
            lines.push(format!(
                "{} *{}*: {}/{} healthy",
                summary.worst.emoji(),
                collector.to_uppercase(),
                summary.passed,
                summary.total
            ));
        }

        lines.join("\n")
    }

    fn issues(&self, issues: &[CollectorResult]) -> String {
        let mut lines = vec![RULE.to_string(), "🚨 *Issues Detected*".to_string()];

        let groups = [
            (HealthStatus::Red, "Critical Issues"),
            (HealthStatus::Yellow, "Warnings"),
            (HealthStatus::Unknown, "Unknown Status"),
        ];

        for (status, title) in groups {
            let group: Vec<_> = issues.iter().filter(|i| i.status == status).collect();
            if group.is_empty() {
                continue;
            }

            lines.push(String::new());
            lines.push(format!("{} *{title}*", status.emoji()));
            for issue in group {
                lines.push(format!("*{}* ({})", issue.target, issue.collector));
                lines.push(format!("└─ {}", issue.message));
                if !issue.metrics.is_empty() && status != HealthStatus::Unknown {
                    lines.push(format!("   📊 {}", issue.metrics.render(MAX_REPORT_METRICS)));
                }
            }
        }

        lines.join("\n")
    }

    fn analysis(&self, analysis: &Analysis) -> String {
        let mut lines = vec![
            RULE.to_string(),
            "🤖 *Analysis*".to_string(),
            format!("*Root Cause*: {}", analysis.root_cause),
            format!("*Severity*: {}", analysis.severity.to_uppercase()),
        ];

        let affected = &analysis.affected_systems;
        if !affected.is_empty() {
            let shown = affected
                .iter()
                .take(MAX_AFFECTED_SYSTEMS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("*Affected Systems*: {shown}"));
            if affected.len() > MAX_AFFECTED_SYSTEMS {
                lines.push(format!("   ... and {} more", affected.len() - MAX_AFFECTED_SYSTEMS));
            }
        }

        if !analysis.recommendations.is_empty() {
            lines.push(String::new());
            lines.push("*Recommended Actions*:".to_string());
            for (i, rec) in analysis.recommendations.iter().enumerate() {
                let priority = rec.priority.to_uppercase();
                lines.push(format!(
                    "{}. {} [{priority}] {}",
                    i + 1,
                    priority_emoji(&priority),
                    rec.action
                ));
                if !rec.rationale.is_empty() {
                    lines.push(format!("   └─ {}", rec.rationale));
                }
            }
        }

        lines.join("\n")
    }

    fn footer(&self, input: &ReportInput<'_>) -> String {
        let mut lines = vec![
            RULE.to_string(),
            format!(
                "⏱️ Execution time: {:.1}s | Tokens: {}",
                input.duration.as_secs_f64(),
                input.tokens_used
            ),
        ];

        if !input.soft_errors.is_empty() {
            lines.push(format!("⚠️ {} soft error(s)", input.soft_errors.len()));
            for error in input.soft_errors {
                lines.push(format!("• {error}"));
            }
        }

        lines.join("\n")
    }
}
