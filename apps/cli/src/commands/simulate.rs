//! Simulate command implementation.

use super::types::FailureInjection;
use super::{OutcomeLog, mock_router};
use crate::config;
use anyhow::{Result, bail};
use colored::Colorize;
use conduit_router::{HealthState, MetricsSnapshot, PreferenceProfile, ProviderHealth, RouteRequest, TaskKind};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SAMPLE_TEXTS: [&str; 6] = [
    "The quarterly report shows revenue growth across every region despite supply delays.",
    "I absolutely loved the new release, the interface feels faster and cleaner.",
    "Please rewrite this paragraph so it sounds friendlier to first-time customers.",
    "Write a function that merges two sorted lists without allocating a new buffer.",
    "Compare the trade-offs between optimistic and pessimistic locking for our ledger.",
    "If every bloop is a razzie and some razzies are lazzies, are some bloops lazzies?",
];

/// Options for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub requests: usize,
    pub concurrency: usize,
    pub failures: Vec<FailureInjection>,
    pub preference: Option<PreferenceProfile>,
    pub seed: Option<u64>,
    pub outcome_log: Option<PathBuf>,
    pub json: bool,
}

/// Synthetic request number `i`, cycling through tasks, texts and profiles.
fn synthetic_request(i: usize, preference: Option<PreferenceProfile>) -> RouteRequest {
    let task = TaskKind::ALL[i % TaskKind::ALL.len()];
    let text = SAMPLE_TEXTS[i % SAMPLE_TEXTS.len()];
    let preference = preference.unwrap_or(PreferenceProfile::ALL[i % PreferenceProfile::ALL.len()]);
    RouteRequest::new(task, text).with_preference(preference).with_request_id(format!("sim_{i:06}"))
}

/// Execute the simulate command.
pub async fn execute(config_path: Option<&Path>, options: SimulateOptions) -> Result<()> {
    if options.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }
    let config = config::load(config_path)?;
    let (sink, log) = match &options.outcome_log {
        Some(path) => {
            // room for every outcome so none are dropped
            let (sink, log) = OutcomeLog::open(path, options.requests.max(1));
            (Some(sink), Some(log))
        }
        None => (None, None),
    };
    let router = mock_router(config, &options.failures, options.seed, sink)?;

    let preference = options.preference;
    let started = Instant::now();
    let results: Vec<bool> = stream::iter(0..options.requests)
        .map(|i| {
            let router = &router;
            async move {
                match router.route(synthetic_request(i, preference)).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::info!(request = i, error = %e, "Simulated request failed");
                        false
                    }
                }
            }
        })
        .buffer_unordered(options.concurrency)
        .collect()
        .await;
    let elapsed = started.elapsed();
    let succeeded = results.iter().filter(|ok| **ok).count();

    let metrics = router.metrics_snapshot();
    let health = router.health_snapshot();
    let provider_status = router.metrics().provider_status();
    drop(router);
    let logged = match log {
        Some(log) => {
            let path = log.path().to_path_buf();
            Some((path, log.finish().await?))
        }
        None => None,
    };

    if options.json {
        let report = json!({
            "requests": options.requests,
            "succeeded": succeeded,
            "failed": options.requests - succeeded,
            "elapsed_secs": elapsed.as_secs_f64(),
            "metrics": metrics,
            "health": health,
            "provider_status": provider_status,
            "outcome_log": logged.as_ref().map(|(path, written)| json!({ "path": path, "written": written })),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&metrics, &health, succeeded, options.requests, elapsed.as_secs_f64());
        if let Some((path, written)) = logged {
            println!("  {written} outcomes written to {}", path.display());
            println!();
        }
    }
    Ok(())
}

fn print_report(
    metrics: &MetricsSnapshot,
    health: &[ProviderHealth],
    succeeded: usize,
    requests: usize,
    elapsed_secs: f64,
) {
    println!();
    println!("{}", "Simulation complete".bold().cyan());
    println!("  {succeeded}/{requests} requests succeeded in {elapsed_secs:.2}s");
    println!(
        "  error rate {:.1}%, fallback rate {:.1}%, total cost ${:.6}",
        metrics.error_rate * 100.0,
        metrics.fallback_rate * 100.0,
        metrics.total_cost_usd
    );
    println!(
        "  latency avg {:.1} ms, p50 {:.1} ms, p95 {:.1} ms, p99 {:.1} ms",
        metrics.latency.avg_ms, metrics.latency.p50_ms, metrics.latency.p95_ms, metrics.latency.p99_ms
    );

    println!();
    println!("{}", "Models".bold());
    for (model, stats) in &metrics.by_model {
        println!(
            "  {:<28} {:>5} requests {:>6.1}% errors {:>8.1} ms p50 {:>8.1} ms p95",
            model,
            stats.requests,
            stats.error_rate * 100.0,
            stats.latency.p50_ms,
            stats.latency.p95_ms
        );
    }

    println!();
    println!("{}", "Provider health".bold());
    for health in health {
        let state = match health.state {
            HealthState::Healthy => health.state.to_string().green(),
            HealthState::Degraded => health.state.to_string().yellow(),
            HealthState::Unhealthy => health.state.to_string().red(),
        };
        println!(
            "  {:<10} {:<10} availability {:.2}, {}/{} failures in window",
            health.provider, state, health.availability_score, health.window_failures, health.window_samples
        );
    }
    println!();
}
