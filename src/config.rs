use std::collections::HashSet;
use std::path::PathBuf;

use tracing::trace;

use crate::status::Threshold;
use crate::util::substitute_env_vars;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    pub telegram: TelegramConfig,

    pub llm: LlmConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between two cycles when running as a daemon
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for the collection phase of one cycle
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Where today's LLM spend is persisted
    #[serde(default = "default_budget_state_file")]
    pub budget_state_file: PathBuf,

    /// Pause between two report chunks
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            budget_state_file: default_budget_state_file(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_cycle_timeout_secs() -> u64 {
    120
}

fn default_budget_state_file() -> PathBuf {
    PathBuf::from("./budget_state.json")
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub http: Vec<HttpTarget>,

    #[serde(default)]
    pub tcp: Vec<TcpTarget>,

    #[serde(default)]
    pub host: Vec<HostTarget>,

    #[serde(default)]
    pub docker: Vec<DockerTarget>,

    #[serde(default)]
    pub model: Vec<ModelTarget>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostTarget {
    pub name: String,
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DockerTarget {
    pub name: String,
    /// Container name as shown by `docker ps`
    pub container: String,
}

/// A model pinged for availability, using the `llm` credentials
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelTarget {
    pub name: String,
    /// Model id, defaults to `llm.model`
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint, defaults to `llm.endpoint`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_model_ping_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_model_ping_timeout_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

/// System-wide thresholds, in percent or milliseconds
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu_red: f64,
    pub cpu_yellow: f64,
    pub ram_red: f64,
    pub ram_yellow: f64,
    pub disk_free_red: f64,
    pub disk_free_yellow: f64,
    pub api_timeout_ms: u64,
    pub api_slow_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_red: 90.0,
            cpu_yellow: 70.0,
            ram_red: 90.0,
            ram_yellow: 70.0,
            disk_free_red: 10.0,
            disk_free_yellow: 20.0,
            api_timeout_ms: 5000,
            api_slow_ms: 2000,
        }
    }
}

impl Thresholds {
    pub fn cpu(&self) -> Threshold {
        Threshold::higher_is_worse(self.cpu_yellow, self.cpu_red)
    }

    pub fn ram(&self) -> Threshold {
        Threshold::higher_is_worse(self.ram_yellow, self.ram_red)
    }

    pub fn disk_free(&self) -> Threshold {
        Threshold::lower_is_worse(self.disk_free_yellow, self.disk_free_red)
    }

    pub fn latency(&self) -> Threshold {
        Threshold::higher_is_worse(self.api_slow_ms as f64, self.api_timeout_ms as f64)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_daily_budget")]
    pub daily_budget_usd: f64,
    #[serde(default = "default_input_price")]
    pub input_price_per_million: f64,
    #[serde(default = "default_output_price")]
    pub output_price_per_million: f64,
    /// Token estimate used for the budget gate before a call
    #[serde(default = "default_estimated_tokens")]
    pub estimated_tokens: u64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_daily_budget() -> f64 {
    3.0
}

fn default_input_price() -> f64 {
    0.80
}

fn default_output_price() -> f64 {
    4.00
}

fn default_estimated_tokens() -> u64 {
    8000
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Reject configurations that would make a cycle meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;

        for (name, value) in [
            ("cpu_red", t.cpu_red),
            ("cpu_yellow", t.cpu_yellow),
            ("ram_red", t.ram_red),
            ("ram_yellow", t.ram_yellow),
            ("disk_free_red", t.disk_free_red),
            ("disk_free_yellow", t.disk_free_yellow),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return invalid(format!("threshold {name} must be within 0..=100, got {value}"));
            }
        }

        if t.cpu_yellow >= t.cpu_red {
            return invalid("cpu_yellow must be below cpu_red");
        }
        if t.ram_yellow >= t.ram_red {
            return invalid("ram_yellow must be below ram_red");
        }
        if t.disk_free_yellow <= t.disk_free_red {
            return invalid("disk_free_yellow must be above disk_free_red");
        }
        if t.api_slow_ms >= t.api_timeout_ms {
            return invalid("api_slow_ms must be below api_timeout_ms");
        }

        if self.monitoring.cycle_timeout_secs == 0 {
            return invalid("cycle_timeout_secs must be positive");
        }
        if self.monitoring.interval_secs == 0 {
            return invalid("interval_secs must be positive");
        }

        if self.llm.daily_budget_usd < 0.1 {
            return invalid("daily_budget_usd must be at least 0.1");
        }
        if self.llm.input_price_per_million < 0.0 || self.llm.output_price_per_million < 0.0 {
            return invalid("token prices must not be negative");
        }

        for target in &self.targets.http {
            if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
                return invalid(format!(
                    "http target {} must use an http:// or https:// URL",
                    target.name
                ));
            }
        }

        unique_names("http", self.targets.http.iter().map(|t| t.name.as_str()))?;
        unique_names("tcp", self.targets.tcp.iter().map(|t| t.name.as_str()))?;
        unique_names("host", self.targets.host.iter().map(|t| t.name.as_str()))?;
        unique_names("docker", self.targets.docker.iter().map(|t| t.name.as_str()))?;
        unique_names("model", self.targets.model.iter().map(|t| t.name.as_str()))?;

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

fn unique_names<'a>(
    collector: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return invalid(format!("{collector} target with empty name"));
        }
        if !seen.insert(name) {
            return invalid(format!("duplicate {collector} target name: {name}"));
        }
    }
    Ok(())
}

/// Parse a configuration from raw JSON, substituting `${VAR}` placeholders first
pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let substituted = substitute_env_vars(raw);
    let config: Config = serde_json::from_str(&substituted)?;
    config.validate()?;
    Ok(config)
}

pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}
