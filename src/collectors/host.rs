//! Compute health of the machine the monitor runs on
//!
//! CPU and RAM are "higher is worse", free disk space is "lower is worse". The
//! result status is the worst of the three.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sysinfo::{Disks, System};
use tokio::time::Instant;
use tracing::{instrument, trace};

use crate::config::{Config, HostTarget, Thresholds};
use crate::metrics::CollectorResult;
use crate::status::HealthStatus;

use super::{Collector, collect_each};

pub const NAME: &str = "host";

/// One reading of the local machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_free_percent: f64,
}

pub struct HostCollector {
    targets: Vec<HostTarget>,
    thresholds: Thresholds,
}

impl HostCollector {
    pub fn new(targets: Vec<HostTarget>, thresholds: Thresholds) -> Self {
        Self {
            targets,
            thresholds,
        }
    }

    pub fn from_config(config: &Config) -> Option<Box<dyn Collector>> {
        if config.targets.host.is_empty() {
            return None;
        }
        Some(Box::new(Self::new(
            config.targets.host.clone(),
            config.thresholds.clone(),
        )))
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    async fn check_host(&self, target: &HostTarget) -> Result<CollectorResult> {
        let disk_path = target.disk_path.clone();
        let sample = tokio::task::spawn_blocking(move || sample_host(&disk_path))
            .await
            .context("host sampling task failed")??;

        trace!("sampled host: {sample:?}");

        Ok(evaluate(&target.name, sample, &self.thresholds))
    }
}

fn sample_host(disk_path: &Path) -> Result<HostSample> {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let total_memory = sys.total_memory();
    let ram_percent = if total_memory == 0 {
        0.0
    } else {
        sys.used_memory() as f64 / total_memory as f64 * 100.0
    };

    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|disk| disk_path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .with_context(|| format!("no mounted disk contains {}", disk_path.display()))?;

    let disk_free_percent = if disk.total_space() == 0 {
        0.0
    } else {
        disk.available_space() as f64 / disk.total_space() as f64 * 100.0
    };

    Ok(HostSample {
        cpu_percent: sys.global_cpu_usage() as f64,
        ram_percent,
        disk_free_percent,
    })
}

/// Turn a sample into a classified result
pub fn evaluate(target: &str, sample: HostSample, thresholds: &Thresholds) -> CollectorResult {
    let cpu = thresholds.cpu().classify(sample.cpu_percent);
    let ram = thresholds.ram().classify(sample.ram_percent);
    let disk = thresholds.disk_free().classify(sample.disk_free_percent);

    let status = cpu.worst(ram).worst(disk);

    let mut problems = Vec::new();
    if cpu.is_issue() {
        problems.push(format!("CPU {:.0}%", sample.cpu_percent));
    }
    if ram.is_issue() {
        problems.push(format!("RAM {:.0}%", sample.ram_percent));
    }
    if disk.is_issue() {
        problems.push(format!("disk {:.0}% used", 100.0 - sample.disk_free_percent));
    }

    let message = if problems.is_empty() {
        format!(
            "CPU {:.0}%, RAM {:.0}%, disk {:.0}% free",
            sample.cpu_percent, sample.ram_percent, sample.disk_free_percent
        )
    } else {
        problems.join(", ")
    };

    CollectorResult::new(NAME, target, status, message)
        .with_metric("cpu_percent", sample.cpu_percent)
        .with_metric("ram_percent", sample.ram_percent)
        .with_metric("disk_free_percent", sample.disk_free_percent)
}

#[async_trait]
impl Collector for HostCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn targets(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    async fn collect(&self, deadline: Instant) -> Result<Vec<CollectorResult>> {
        Ok(collect_each(NAME, &self.targets, deadline, |target| self.check_host(target)).await)
    }
}

impl HostTarget {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disk_path: PathBuf::from("/"),
        }
    }
}
