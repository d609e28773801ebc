use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use infra_monitoring::{
    analysis::{AnalysisStage, MessagesClient},
    budget::{BudgetTracker, FileBudgetStore, PriceTable},
    collectors,
    config::{Config, read_config_file},
    cycle::MonitoringCycle,
    delivery::{ConsoleChannel, Deliverer, NotificationChannel, TelegramChannel},
    orchestrator::Orchestrator,
    report::ReportFormatter,
    retry::RetryPolicy,
    util::{get_config_path, get_log_level},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "infra-monitor", about = "Infrastructure health checks with budgeted analysis")]
struct Args {
    /// Config file (defaults to $MONITOR_CONFIG or ./config.json)
    #[arg(short)]
    file: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the report instead of sending it
    #[arg(long)]
    dry_run: bool,
}

fn init() {
    let level = LevelFilter::from_level(get_log_level());
    let filter = filter::Targets::new().with_targets(vec![
        ("infra_monitoring", level),
        ("infra_monitor", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn build_cycle(config: &Config, dry_run: bool) -> MonitoringCycle {
    let collectors = collectors::from_config(config);
    if collectors.is_empty() {
        warn!("no targets configured, reports will be empty");
    }
    let orchestrator = Orchestrator::new(
        collectors,
        Duration::from_secs(config.monitoring.cycle_timeout_secs),
    );

    let store = Arc::new(FileBudgetStore::new(&config.monitoring.budget_state_file));
    let prices = PriceTable {
        input_per_million: config.llm.input_price_per_million,
        output_per_million: config.llm.output_price_per_million,
    };
    let budget = BudgetTracker::new(store, config.llm.daily_budget_usd, prices);
    let analysis = AnalysisStage::new(
        Arc::new(MessagesClient::new(&config.llm)),
        budget,
        RetryPolicy::default(),
        config.llm.estimated_tokens,
    );

    let (channel, chunk_delay): (Arc<dyn NotificationChannel>, _) = if dry_run {
        (Arc::new(ConsoleChannel), Duration::ZERO)
    } else {
        (
            Arc::new(TelegramChannel::new(&config.telegram)),
            Duration::from_millis(config.monitoring.chunk_delay_ms),
        )
    };
    let deliverer = Deliverer::new(channel, RetryPolicy::default(), chunk_delay);

    MonitoringCycle::new(orchestrator, analysis, ReportFormatter::default(), deliverer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let config =
        read_config_file(&path).with_context(|| format!("failed to load config from {path}"))?;

    let cycle = build_cycle(&config, args.dry_run);

    if args.once {
        let state = cycle.run().await;
        if state.delivery.as_ref().is_some_and(|d| !d.is_complete()) {
            anyhow::bail!("report was only partially delivered");
        }
        return Ok(());
    }

    info!(
        "monitoring every {}s, press Ctrl-C to stop",
        config.monitoring.interval_secs
    );
    let finished = cycle
        .run_until(
            Duration::from_secs(config.monitoring.interval_secs),
            tokio::signal::ctrl_c(),
        )
        .await;
    trace!("{finished} cycles completed");

    Ok(())
}
