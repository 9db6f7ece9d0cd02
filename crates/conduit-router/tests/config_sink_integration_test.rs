//! Integration tests for routers built from TOML configuration and for
//! outcome delivery to the JSON-lines log.

use conduit_abstraction::TaskKind;
use conduit_providers::{MockProvider, ProviderSet};
use conduit_router::{
    JsonlWriter, Outcome, PreferenceProfile, RouteRequest, Router, RouterConfigLoader, RoutingError,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[routing]
max_attempts = 2
default_preference = "cheap"
min_attempt_timeout_ms = 200

[health]
consecutive_failures = 2

[[models]]
id = "local/tiny"
provider = "local"
tasks = ["chat", "sentiment"]
max_input_tokens = 2048
max_output_tokens = 256
input_price_per_1k = 0.0
output_price_per_1k = 0.0
latency_ms = 30
quality = 0.55

[[models]]
id = "cloud/large"
provider = "cloud"
tasks = ["chat", "code", "analysis"]
max_input_tokens = 128000
max_output_tokens = 4096
input_price_per_1k = 0.003
output_price_per_1k = 0.015
latency_ms = 900
quality = 0.95
"#;

fn write_config() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{CONFIG}").unwrap();
    file
}

#[tokio::test]
async fn test_router_from_config_file() {
    let file = write_config();
    let config = RouterConfigLoader::load(file.path()).unwrap();
    let registry = config.registry().unwrap();
    let router = Router::builder()
        .config(config)
        .providers(ProviderSet::mock_for(registry.providers()))
        .build()
        .unwrap();

    assert_eq!(router.registry().len(), 2);
    assert_eq!(router.settings().max_attempts, 2);

    let decision = router.route(RouteRequest::new(TaskKind::Chat, "how are you today")).await.unwrap();
    assert_eq!(decision.preference, PreferenceProfile::Cheap);
    assert_eq!(decision.selected.model_id(), "local/tiny");
    assert_eq!(decision.alternatives(), ["cloud/large"]);

    let err = router.route(RouteRequest::new(TaskKind::Rewrite, "fix this")).await.unwrap_err();
    assert!(matches!(err, RoutingError::NoEligibleModel { task: TaskKind::Rewrite, .. }));
}

#[tokio::test]
async fn test_config_failure_thresholds_apply() {
    let config = RouterConfigLoader::from_toml_str(CONFIG).unwrap();
    let mut providers = ProviderSet::new();
    providers.insert(Arc::new(MockProvider::new("local").with_latency(0, 1).with_failure_rate(1.0)));
    providers.insert(Arc::new(MockProvider::new("cloud").with_latency(0, 1)));
    let router = Router::builder().config(config).providers(providers).build().unwrap();

    let decision = router.route(RouteRequest::new(TaskKind::Chat, "first")).await.unwrap();
    assert_eq!(decision.selected.model_id(), "cloud/large");
    let decision = router.route(RouteRequest::new(TaskKind::Chat, "second")).await.unwrap();
    assert_eq!(decision.failures.len(), 1);

    // Two failures in a row with consecutive_failures = 2.
    let local = router.health().provider_snapshot("local").unwrap();
    assert_eq!(local.state, conduit_router::HealthState::Unhealthy);
    assert_eq!(local.availability_score, 0.0);
}

#[tokio::test]
async fn test_outcomes_reach_jsonl_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outcomes.jsonl");
    let (sink, writer) = JsonlWriter::channel(&path, 16);

    let config = RouterConfigLoader::from_toml_str(CONFIG).unwrap();
    let router = Router::builder()
        .config(config)
        .providers(ProviderSet::mock_for(["local", "cloud"]))
        .sink(Arc::new(sink))
        .build()
        .unwrap();

    router.route(RouteRequest::new(TaskKind::Chat, "one").with_request_id("req_one")).await.unwrap();
    router
        .route(RouteRequest::new(TaskKind::Code, "two").with_request_id("req_two"))
        .await
        .unwrap();
    drop(router);

    assert_eq!(writer.await.unwrap().unwrap(), 2);
    let content = std::fs::read_to_string(&path).unwrap();
    let outcomes: Vec<Outcome> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].request_id, "req_one");
    assert_eq!(outcomes[1].model_id, "cloud/large");
    assert!(outcomes.iter().all(|o| o.success));
}
