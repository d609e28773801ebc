//! Full cycles from collection to delivery

use std::sync::Arc;
use std::time::Duration;

use infra_monitoring::{
    analysis::{AnalysisSource, MessagesClient},
    budget::{BudgetState, BudgetStore, MemoryBudgetStore},
    collectors::{Collector, http::HttpCollector},
    config::{HttpTarget, LlmConfig, TelegramConfig, Thresholds},
    cycle::CyclePhase,
    delivery::{Deliverer, MessageFormat, TelegramChannel},
    metrics::CollectorResult,
    report::RenderedReport,
    retry::RetryPolicy,
    status::HealthStatus,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn green(collector: &str, target: &str) -> CollectorResult {
    CollectorResult::new(collector, target, HealthStatus::Green, "OK")
}

#[tokio::test]
async fn test_all_green_skips_analysis() {
    let model = CannedModel::new(ANALYSIS_JSON);
    let channel = RecordingChannel::new();
    let store = Arc::new(MemoryBudgetStore::new());

    let cycle = build_cycle(CycleParts {
        collectors: vec![
            StaticCollector::new("http", vec![green("http", "api")]),
            StaticCollector::new("host", vec![green("host", "local")]),
            StaticCollector::new("docker", vec![green("docker", "web")]),
        ],
        model: model.clone(),
        store: store.clone(),
        channel: channel.clone(),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    let state = cycle.run().await;

    assert_eq!(state.phase, CyclePhase::Done);
    assert!(state.issues().is_empty());
    assert!(state.analysis.is_none());
    assert_eq!(model.calls(), 0);
    assert_eq!(state.tokens_used, 0);

    let text = state.report_text();
    assert!(text.contains("*Overall Status*: Healthy"));
    assert!(text.ends_with("Tokens: 0"));
    assert!(!text.contains("Issues Detected"));
    assert!(!text.contains("*Analysis*"));

    assert_eq!(channel.texts(), vec![text]);
    assert_eq!(state.delivered_chunks(), 1);
    assert_eq!(store.load().await.unwrap(), None);
}

#[tokio::test]
async fn test_red_issue_is_analyzed() {
    let model = CannedModel::new(ANALYSIS_JSON);
    let channel = RecordingChannel::new();
    let store = Arc::new(MemoryBudgetStore::new());

    let cycle = build_cycle(CycleParts {
        collectors: vec![
            StaticCollector::new("http", vec![green("http", "api")]),
            StaticCollector::new(
                "host",
                vec![
                    CollectorResult::new("host", "web-1", HealthStatus::Red, "disk 95% used")
                        .with_metric("disk_free_percent", 5.0),
                ],
            ),
        ],
        model: model.clone(),
        store: store.clone(),
        channel: channel.clone(),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    let state = cycle.run().await;

    assert_eq!(state.issues().len(), 1);
    assert_eq!(state.overall(), HealthStatus::Red);
    assert_eq!(model.calls(), 1);

    let analysis = state.analysis.as_ref().unwrap();
    assert_eq!(analysis.source, AnalysisSource::Model);
    assert!(!analysis.recommendations.is_empty());
    assert_eq!(state.tokens_used, 2400);

    let text = state.report_text();
    assert!(text.contains("*web-1* (host)\n└─ disk 95% used"));
    assert!(text.contains("*Recommended Actions*:\n1. 🔥 [IMMEDIATE] Enable logrotate for /var/log/app"));
    assert!(text.contains("Tokens: 2400"));

    // 2000 * 0.80/M + 400 * 4.00/M
    let spent = store.load().await.unwrap().unwrap().spent;
    assert!((spent - 0.0032).abs() < 1e-9);
}

#[tokio::test]
async fn test_exhausted_budget_skips_model() {
    let model = CannedModel::new(ANALYSIS_JSON);
    let store = Arc::new(MemoryBudgetStore::with_state(BudgetState {
        date: today(),
        spent: 3.0 - 0.001,
        daily_limit: 3.0,
    }));

    let cycle = build_cycle(CycleParts {
        collectors: vec![StaticCollector::new(
            "host",
            vec![CollectorResult::new("host", "web-1", HealthStatus::Red, "disk 95% used")],
        )],
        model: model.clone(),
        store: store.clone(),
        channel: RecordingChannel::new(),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    let state = cycle.run().await;

    let analysis = state.analysis.as_ref().unwrap();
    assert_eq!(analysis.source, AnalysisSource::BudgetExhausted);
    assert_eq!(analysis.usage.total(), 0);
    assert_eq!(analysis.affected_systems, vec!["web-1".to_string()]);
    assert_eq!(model.calls(), 0);
    assert_eq!(state.tokens_used, 0);

    let spent = store.load().await.unwrap().unwrap().spent;
    assert!((spent - 2.999).abs() < 1e-12);

    let text = state.report_text();
    assert!(text.contains("budget exhausted"));
    assert!(text.contains("model budget at 100%"));
}

#[tokio::test]
async fn test_delivery_stops_at_failed_chunk() {
    let report = RenderedReport {
        sections: vec![
            "🔴 *Infrastructure Health Report*\nheader".to_string(),
            format!("CHUNK-TWO {}", "x".repeat(25)),
            format!("CHUNK-THREE {}", "y".repeat(25)),
        ],
    };
    let chunks = report.chunks(40);
    assert_eq!(chunks.len(), 3);

    let channel = RecordingChannel::failing_on("CHUNK-TWO");
    let deliverer = Deliverer::new(
        channel.clone(),
        RetryPolicy::immediate(3),
        Duration::ZERO,
    );

    let outcome = deliverer.deliver(&chunks).await;

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.total, 3);

    let sent = channel.sent();
    // markdown once, then plain text until retries run out
    assert_eq!(sent[1].1, MessageFormat::Markdown);
    assert_eq!(
        sent[2..].iter().filter(|(_, f)| *f == MessageFormat::Plain).count(),
        3
    );
    assert!(channel.texts().iter().all(|t| !t.contains("CHUNK-THREE")));
}

#[tokio::test]
async fn test_partial_delivery_is_reported_in_state() {
    let issues: Vec<_> = (0..30)
        .map(|i| CollectorResult::new("http", format!("endpoint-{i}"), HealthStatus::Red, "HTTP 503"))
        .collect();
    let channel = RecordingChannel::failing_on("endpoint-");

    let cycle = build_cycle(CycleParts {
        collectors: vec![StaticCollector::new("http", issues)],
        model: CannedModel::new(ANALYSIS_JSON),
        store: Arc::new(MemoryBudgetStore::new()),
        channel: channel.clone(),
        daily_limit: 3.0,
        max_chunk_chars: 300,
    });

    let state = cycle.run().await;

    assert!(state.chunks.len() >= 3);
    assert!(state.chunks[0].contains("*Overall Status*: Critical Issues"));
    assert_eq!(state.delivered_chunks(), 1);
    assert_eq!(state.chunks.concat(), state.report_text());
    assert!(!channel.texts().contains(&state.chunks[2]));
}

#[tokio::test]
async fn test_http_outage_through_real_clients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": ANALYSIS_JSON }],
            "usage": { "input_tokens": 800, "output_tokens": 200 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bottoken/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let http: Arc<dyn Collector> = Arc::new(HttpCollector::new(
        vec![HttpTarget {
            name: "api".to_string(),
            url: format!("{}/health", server.uri()),
            timeout_ms: 2000,
        }],
        Thresholds::default(),
    ));
    let llm: LlmConfig = serde_json::from_value(serde_json::json!({
        "endpoint": format!("{}/v1/messages", server.uri()),
        "api_key": "key",
        "model": "small-model"
    }))
    .unwrap();
    let telegram = TelegramConfig {
        bot_token: "token".to_string(),
        chat_id: "1".to_string(),
        api_url: server.uri(),
    };

    let cycle = build_cycle(CycleParts {
        collectors: vec![http],
        model: Arc::new(MessagesClient::new(&llm)),
        store: Arc::new(MemoryBudgetStore::new()),
        channel: Arc::new(TelegramChannel::new(&telegram)),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    let state = cycle.run().await;

    assert_eq!(state.overall(), HealthStatus::Red);
    assert_eq!(state.issues()[0].message, "HTTP 503");
    assert_eq!(state.tokens_used, 1000);
    assert_eq!(state.delivered_chunks(), 1);
}

/// Collector that never finishes within a test
struct Stuck;

#[async_trait::async_trait]
impl Collector for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    fn targets(&self) -> Vec<String> {
        vec!["slow-host".to_string()]
    }

    async fn collect(&self, _deadline: tokio::time::Instant) -> anyhow::Result<Vec<CollectorResult>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![])
    }
}

#[tokio::test]
async fn test_shutdown_during_run_is_not_lost() {
    let channel = RecordingChannel::new();
    let cycle = build_cycle(CycleParts {
        collectors: vec![Arc::new(Stuck)],
        model: CannedModel::new(ANALYSIS_JSON),
        store: Arc::new(MemoryBudgetStore::new()),
        channel: channel.clone(),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    // fires while the first run is still collecting
    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    let start = std::time::Instant::now();
    let finished = tokio::time::timeout(
        Duration::from_secs(20),
        cycle.run_until(Duration::from_secs(3600), shutdown),
    )
    .await
    .expect("shutdown was lost");

    assert_eq!(finished, 0);
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(channel.texts().is_empty());
}

#[tokio::test]
async fn test_run_until_keeps_cycling() {
    let channel = RecordingChannel::new();
    let cycle = build_cycle(CycleParts {
        collectors: vec![StaticCollector::new("http", vec![green("http", "api")])],
        model: CannedModel::new(ANALYSIS_JSON),
        store: Arc::new(MemoryBudgetStore::new()),
        channel: channel.clone(),
        daily_limit: 3.0,
        max_chunk_chars: 4000,
    });

    let shutdown = tokio::time::sleep(Duration::from_millis(250));
    let finished = cycle
        .run_until(Duration::from_millis(50), shutdown)
        .await;

    assert!(finished >= 2);
    // a run cut short by shutdown may already have delivered
    let delivered = channel.texts().len();
    assert!(delivered == finished || delivered == finished + 1);
}
