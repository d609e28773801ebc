use std::sync::LazyLock;

use regex::{Captures, Regex};

const MONITOR_CONFIG: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG: &str = "./config.json";

pub fn get_config_path() -> String {
    std::env::var(MONITOR_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG.to_string())
}

const MONITOR_LOG: &str = "MONITOR_LOG";

const DEFAULT_LOG: tracing::Level = tracing::Level::INFO;

pub fn get_log_level() -> tracing::Level {
    let level_from_env = std::env::var(MONITOR_LOG);
    level_from_env.map_or(DEFAULT_LOG, |res| res.parse().unwrap_or(DEFAULT_LOG))
}

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").expect("placeholder pattern is valid"));

/// Replace every `${VAR}` in a JSON document with the value of the environment
/// variable (empty when unset)
pub fn substitute_env_vars(raw: &str) -> String {
    substitute_with(raw, |name| std::env::var(name).ok())
}

/// Values are JSON-escaped, so quotes or backslashes in a secret cannot break
/// out of the string literal holding the placeholder.
pub fn substitute_with<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(raw, |caps: &Captures| {
            lookup(&caps[1]).map(|value| json_escape(&value)).unwrap_or_default()
        })
        .into_owned()
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
