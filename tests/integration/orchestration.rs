//! Collector isolation and the cycle deadline with real collectors

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use infra_monitoring::{
    collectors::{self, Collector, http::HttpCollector},
    config::{HttpTarget, Thresholds, parse_config},
    metrics::{CollectorResult, UNNAMED_TARGET},
    orchestrator::{Orchestrator, TIMED_OUT_MESSAGE},
    status::HealthStatus,
};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

/// Never finishes within any reasonable cycle
struct Hanging;

#[async_trait]
impl Collector for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    fn targets(&self) -> Vec<String> {
        vec!["bucket-a".to_string(), "bucket-b".to_string()]
    }

    async fn collect(&self, _deadline: tokio::time::Instant) -> anyhow::Result<Vec<CollectorResult>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![])
    }
}

struct Crashing;

#[async_trait]
impl Collector for Crashing {
    fn name(&self) -> &str {
        "crashing"
    }

    fn targets(&self) -> Vec<String> {
        vec!["vm-1".to_string()]
    }

    async fn collect(&self, _deadline: tokio::time::Instant) -> anyhow::Result<Vec<CollectorResult>> {
        let metrics: Vec<f64> = Vec::new();
        Ok(vec![CollectorResult::new(
            "crashing",
            "vm-1",
            HealthStatus::Green,
            format!("{}", metrics[3]),
        )])
    }
}

#[tokio::test]
async fn test_registry_collectors_run_concurrently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let db_port = listener.local_addr().unwrap().port();

    let config = parse_config(&format!(
        r#"{{
            "targets": {{
                "http": [
                    {{ "name": "api", "url": "{uri}/ok" }},
                    {{ "name": "admin", "url": "{uri}/broken" }}
                ],
                "tcp": [{{ "name": "postgres", "host": "127.0.0.1", "port": {db_port} }}]
            }},
            "telegram": {{ "bot_token": "t", "chat_id": "c" }},
            "llm": {{ "endpoint": "http://localhost", "api_key": "k", "model": "m" }}
        }}"#,
        uri = server.uri()
    ))
    .unwrap();

    let orchestrator = Orchestrator::new(collectors::from_config(&config), Duration::from_secs(10));
    let results = orchestrator.collect().await;

    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.collector.as_str(), r.target.as_str(), r.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("http", "api", HealthStatus::Green),
            ("http", "admin", HealthStatus::Red),
            ("database", "postgres", HealthStatus::Green),
        ]
    );
}

#[tokio::test]
async fn test_deadline_keeps_finished_results() {
    let orchestrator = Orchestrator::new(
        vec![
            StaticCollector::new(
                "docker",
                vec![CollectorResult::new("docker", "web", HealthStatus::Green, "Up 2 hours")],
            ),
            Arc::new(Hanging),
            Arc::new(Crashing),
        ],
        Duration::from_millis(200),
    );

    let start = Instant::now();
    let results = orchestrator.collect().await;
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].status, HealthStatus::Green);

    assert_eq!(results[1].target, "bucket-a");
    assert_eq!(results[2].target, "bucket-b");
    for result in &results[1..3] {
        assert_eq!(result.collector, "hanging");
        assert_eq!(result.status, HealthStatus::Unknown);
        assert_eq!(result.message, TIMED_OUT_MESSAGE);
    }

    assert_eq!(results[3].collector, "crashing");
    assert_eq!(results[3].target, UNNAMED_TARGET);
    assert_eq!(results[3].status, HealthStatus::Unknown);
    assert!(results[3].message.starts_with("Collection error"));
}

#[tokio::test]
async fn test_deadline_keeps_finished_targets_of_same_collector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fast"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let target = |name: &str| HttpTarget {
        name: name.to_string(),
        url: format!("{}/{name}", server.uri()),
        timeout_ms: 30_000,
    };
    let http: Arc<dyn Collector> = Arc::new(HttpCollector::new(
        vec![target("fast"), target("slow")],
        Thresholds::default(),
    ));

    let orchestrator = Orchestrator::new(vec![http], Duration::from_millis(500));
    let start = Instant::now();
    let results = orchestrator.collect().await;
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].target, "fast");
    assert_eq!(results[0].status, HealthStatus::Green);
    assert_eq!(results[1].target, "slow");
    assert_eq!(results[1].status, HealthStatus::Unknown);
    assert_eq!(results[1].message, TIMED_OUT_MESSAGE);
}
