//! Model availability pings
//!
//! Every target gets a minimal completion request of at most
//! [`PING_MAX_TOKENS`] tokens:
//!
//! - answered → GREEN, with the tokens the ping used
//! - throttled → YELLOW
//! - model not found, unavailable or no answer in time → RED

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::{Instant, timeout};
use tracing::{instrument, trace};

use crate::analysis::{ExplanatoryModel, MessagesClient, ModelError};
use crate::config::{Config, LlmConfig, ModelTarget};
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

use super::{Collector, TargetName, collect_each};

pub const NAME: &str = "model";

/// Completion cap of one ping
pub const PING_MAX_TOKENS: u32 = 10;

const PING_PROMPT: &str = "ping";

/// A target together with the client that reaches it
struct Pinged {
    target: ModelTarget,
    client: MessagesClient,
}

impl TargetName for Pinged {
    fn target_name(&self) -> &str {
        &self.target.name
    }
}

pub struct ModelCollector {
    targets: Vec<Pinged>,
}

impl ModelCollector {
    /// Targets without their own model or endpoint use the ones from `llm`
    pub fn new(targets: Vec<ModelTarget>, llm: &LlmConfig) -> Self {
        let targets = targets
            .into_iter()
            .map(|target| {
                let mut config = llm.clone();
                if let Some(endpoint) = &target.endpoint {
                    config.endpoint = endpoint.clone();
                }
                let model = target.model.clone().unwrap_or_else(|| llm.model.clone());
                let client = MessagesClient::new(&config).with_model(model, PING_MAX_TOKENS);
                Pinged { target, client }
            })
            .collect();

        Self { targets }
    }

    pub fn from_config(config: &Config) -> Option<Box<dyn Collector>> {
        if config.targets.model.is_empty() {
            return None;
        }
        Some(Box::new(Self::new(config.targets.model.clone(), &config.llm)))
    }

    #[instrument(skip(self, pinged), fields(target = %pinged.target.name))]
    async fn check_model(&self, pinged: &Pinged) -> Result<CollectorResult> {
        let name = pinged.target.name.as_str();
        let model_id = pinged.client.model();
        trace!("pinging model {model_id}");

        let start = Instant::now();
        let answer = timeout(
            Duration::from_millis(pinged.target.timeout_ms),
            pinged.client.invoke(PING_PROMPT, None),
        )
        .await;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = match answer {
            Ok(Ok(response)) => {
                let tokens = response.input_tokens + response.output_tokens;
                CollectorResult::new(
                    NAME,
                    name,
                    HealthStatus::Green,
                    format!("Model accessible ({tokens} tokens)"),
                )
                .with_metric("tokens_used", tokens)
            }
            Ok(Err(ModelError::Throttled(detail))) => {
                CollectorResult::new(NAME, name, HealthStatus::Yellow, "API throttled")
                    .with_error(detail)
            }
            Ok(Err(ModelError::NotFound(detail))) => {
                CollectorResult::new(NAME, name, HealthStatus::Red, "Model not found")
                    .with_error(detail)
            }
            Ok(Err(e)) => CollectorResult::new(
                NAME,
                name,
                HealthStatus::Red,
                format!("Unavailable: {e}"),
            )
            .with_error(e.to_string()),
            Err(_) => CollectorResult::new(NAME, name, HealthStatus::Red, "Request timeout")
                .with_error(format!("no answer within {}ms", pinged.target.timeout_ms)),
        };

        Ok(result
            .with_metric("model_id", model_id)
            .with_metric("response_time_ms", response_time_ms))
    }
}

#[async_trait]
impl Collector for ModelCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.target.name.clone()).collect()
    }

    async fn collect(&self, deadline: Instant) -> Result<Vec<CollectorResult>> {
        Ok(collect_each(NAME, &self.targets, deadline, |pinged| self.check_model(pinged)).await)
    }
}
