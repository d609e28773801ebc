//! Prompt construction for the explanatory model

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::metrics::CollectorResult;

/// Metrics rendered per issue, keeps the prompt bounded
pub const MAX_PROMPT_METRICS: usize = 5;

pub const SYSTEM_PROMPT: &str = "You are an expert Site Reliability Engineer and infrastructure analyst.

Your expertise includes root cause analysis and issue correlation, container \
operations, database reliability, API monitoring and system resource tuning.

Your analysis should be practical and concise, reference the specific metrics \
and symptoms you were given, and use the requested JSON format.

Always correlate related issues to identify systemic problems rather than \
treating each issue in isolation.";

const INSTRUCTIONS: &str = r#"
---

Analyze these infrastructure issues and provide:

1. **Root Cause**: the underlying cause, correlating related issues
2. **Severity**: overall impact (critical/high/medium/low)
3. **Affected Systems**: impacted system names
4. **Recommendations**: specific remediation steps with priorities

**Respond in JSON format:**

```json
{
  "root_cause": "Brief explanation of the underlying cause",
  "severity": "critical|high|medium|low",
  "affected_systems": ["system1", "system2"],
  "recommendations": [
    {
      "priority": "immediate|high|medium|low",
      "action": "Specific remediation step",
      "rationale": "Why this will help resolve the issue"
    }
  ]
}
```

Be concise and practical.
"#;

/// Render the issues, grouped by collector in name order
pub fn build_prompt(issues: &[CollectorResult]) -> String {
    let mut by_collector: BTreeMap<&str, Vec<&CollectorResult>> = BTreeMap::new();
    for issue in issues {
        by_collector
            .entry(issue.collector.as_str())
            .or_default()
            .push(issue);
    }

    let mut prompt = String::from("# Infrastructure Issues Detected\n\n");

    for (collector, issues) in by_collector {
        let _ = writeln!(prompt, "## {} Issues\n", collector.to_uppercase());

        for issue in issues {
            let _ = writeln!(
                prompt,
                "{} [{}]: {}",
                issue.target,
                issue.status.label(),
                issue.message
            );
            if !issue.metrics.is_empty() {
                let _ = writeln!(
                    prompt,
                    "- Metrics: {}",
                    issue.metrics.render(MAX_PROMPT_METRICS)
                );
            }
            if let Some(error) = &issue.error {
                let _ = writeln!(prompt, "- Error: {error}");
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(INSTRUCTIONS);
    prompt
}
