//! Container status from the local docker daemon
//!
//! One `docker ps -a` invocation serves every configured container. Failing to
//! run docker at all is a collector-level error.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, warn};

use crate::config::{Config, DockerTarget};
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

use super::{Collector, timed_out};

pub const NAME: &str = "docker";

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

pub struct DockerCollector {
    targets: Vec<DockerTarget>,
}

impl DockerCollector {
    pub fn new(targets: Vec<DockerTarget>) -> Self {
        Self { targets }
    }

    pub fn from_config(config: &Config) -> Option<Box<dyn Collector>> {
        if config.targets.docker.is_empty() {
            return None;
        }
        Some(Box::new(Self::new(config.targets.docker.clone())))
    }

    #[instrument(skip(self))]
    async fn list_containers(&self) -> Result<String> {
        let output = Command::new("docker")
            .args(["ps", "-a", "--format", "{{json .}}"])
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run docker")?;

        if !output.status.success() {
            bail!(
                "docker ps exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8(output.stdout).context("docker output is not UTF-8")
    }
}

/// Parse `docker ps` output, skipping lines that are not container records
pub fn parse_containers(output: &str) -> HashMap<String, ContainerInfo> {
    let mut containers = HashMap::new();
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        match serde_json::from_str::<ContainerInfo>(line) {
            Ok(info) => {
                for name in info.names.split(',') {
                    containers.insert(name.trim().to_string(), info.clone());
                }
            }
            Err(e) => warn!("skipping unparseable docker ps line: {e}"),
        }
    }
    containers
}

pub fn evaluate(
    targets: &[DockerTarget],
    containers: &HashMap<String, ContainerInfo>,
) -> Vec<CollectorResult> {
    targets
        .iter()
        .map(|target| match containers.get(&target.container) {
            Some(info) => {
                let status = match info.state.as_str() {
                    "running" => HealthStatus::Green,
                    "restarting" | "paused" | "created" => HealthStatus::Yellow,
                    _ => HealthStatus::Red,
                };
                let message = if info.status.is_empty() {
                    info.state.clone()
                } else {
                    info.status.clone()
                };
                CollectorResult::new(NAME, &target.name, status, message)
                    .with_metric("state", info.state.as_str())
                    .with_metric("container", target.container.as_str())
            }
            None => CollectorResult::new(
                NAME,
                &target.name,
                HealthStatus::Red,
                format!("Container {} not found", target.container),
            )
            .with_metric("container", target.container.as_str()),
        })
        .collect()
}

#[async_trait]
impl Collector for DockerCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    async fn collect(&self, deadline: Instant) -> Result<Vec<CollectorResult>> {
        let Ok(output) = timeout_at(deadline, self.list_containers()).await else {
            warn!("docker ps did not finish before the cycle deadline");
            return Ok(self
                .targets
                .iter()
                .map(|target| timed_out(NAME, &target.name))
                .collect());
        };
        let output = output?;
        let containers = parse_containers(&output);
        debug!("docker reports {} container name(s)", containers.len());
        Ok(evaluate(&self.targets, &containers))
    }
}
