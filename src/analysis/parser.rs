//! Tolerant parsing of model responses
//!
//! Models wrap their JSON in fenced blocks, prepend an explanation or append a
//! summary. The parser scans for the first balanced `{...}` that is valid JSON
//! and fills in every field the model left out.

use serde::Deserialize;

use super::Recommendation;

/// Fields of a parsed analysis, before usage is attached
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParsedAnalysis {
    #[serde(default = "default_root_cause")]
    pub root_cause: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

fn default_root_cause() -> String {
    "Unable to determine root cause".to_string()
}

fn default_severity() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("response JSON does not match the analysis schema: {0}")]
    Schema(String),
}

/// Byte range of the balanced object starting at `start`, if it closes
fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// First balanced substring that parses as a JSON object
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| balanced_object(text, start))
        .filter_map(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
        .find(|value| value.is_object())
}

pub fn parse_analysis(text: &str) -> Result<ParsedAnalysis, ParseError> {
    let value = extract_json_object(text).ok_or(ParseError::NoJson)?;
    serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))
}
