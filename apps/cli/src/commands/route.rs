//! Route command implementation.

use super::{OutcomeLog, mock_router};
use crate::config;
use anyhow::{Context, Result};
use colored::Colorize;
use conduit_router::{PreferenceProfile, RouteRequest, RoutingDecision, TaskKind};
use std::path::{Path, PathBuf};

/// Options for a single routed request.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub text: String,
    pub task: TaskKind,
    pub preference: Option<PreferenceProfile>,
    pub max_cost: Option<f64>,
    pub max_latency: Option<u64>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub outcome_log: Option<PathBuf>,
    pub json: bool,
}

impl RouteOptions {
    pub(crate) fn request(&self) -> RouteRequest {
        let mut request = RouteRequest::new(self.task, self.text.clone());
        request.preference = self.preference;
        request.max_cost_usd = self.max_cost;
        request.max_latency_ms = self.max_latency;
        request.model_override.clone_from(&self.model);
        request.max_tokens = self.max_tokens;
        request
    }
}

/// Execute the route command.
pub async fn execute(config_path: Option<&Path>, options: RouteOptions) -> Result<()> {
    let config = config::load(config_path)?;
    let (sink, log) = match &options.outcome_log {
        Some(path) => {
            let (sink, log) = OutcomeLog::open(path, 16);
            (Some(sink), Some(log))
        }
        None => (None, None),
    };
    let router = mock_router(config, &[], None, sink)?;

    let result = router.route(options.request()).await;
    drop(router);
    if let Some(log) = log {
        log.finish().await?;
    }
    let decision = result.context("Routing failed")?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&decision);
    }
    Ok(())
}

fn print_decision(decision: &RoutingDecision) {
    let selected = &decision.selected;
    println!();
    println!("{} {}", "Selected:".bold(), selected.model_id().cyan());
    println!("  {:<14} {}", "Provider", selected.provider());
    println!("  {:<14} {}", "Request", decision.request_id.dimmed());
    println!("  {:<14} {} / {}", "Task", decision.task, decision.preference);
    println!("  {:<14} {:.3}", "Score", selected.final_score);
    println!(
        "  {:<14} ${:.6} (saved ${:.6})",
        "Cost", decision.cost.total_cost_usd, decision.cost.estimated_savings_usd
    );
    println!(
        "  {:<14} {:.1} ms (routing {:.2} ms, provider {:.1} ms)",
        "Latency", decision.latency.total_ms, decision.latency.routing_ms, decision.latency.provider_ms
    );
    println!(
        "  {:<14} {} in / {} out",
        "Tokens", decision.usage.input_tokens, decision.usage.output_tokens
    );

    let alternatives = decision.alternatives();
    if !alternatives.is_empty() {
        println!("  {:<14} {}", "Alternatives", alternatives.join(", ").dimmed());
    }
    for failure in &decision.failures {
        println!("  {:<14} {}", "Failed".yellow(), failure);
    }

    println!();
    println!("{}", decision.rationale().dimmed());
    println!();
    println!("{}", decision.text);
}
