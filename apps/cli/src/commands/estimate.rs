//! Estimate command implementation.

use super::mock_router;
use super::route::RouteOptions;
use crate::config;
use anyhow::{Context, Result};
use colored::Colorize;
use conduit_router::RoutingPlan;
use serde_json::json;
use std::path::Path;

/// Execute the estimate command: rank candidates and price the request
/// without invoking a provider.
pub fn execute(config_path: Option<&Path>, options: &RouteOptions) -> Result<()> {
    let config = config::load(config_path)?;
    let router = mock_router(config, &[], None, None)?;
    let plan = router.plan(&options.request()).context("Estimate failed")?;
    let selected = plan.selected().context("No candidate ranked")?;

    if options.json {
        let report = json!({
            "selected_model": selected.model_id(),
            "estimated_cost_usd": selected.estimated_cost_usd,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

fn print_plan(plan: &RoutingPlan) {
    println!();
    if let Some(selected) = plan.selected() {
        println!("{} {}", "Selected:".bold(), selected.model_id().cyan());
        println!("  {:<16} ${:.6}", "Estimated cost", selected.estimated_cost_usd);
    }
    println!("  {:<16} {} / {}", "Task", plan.task, plan.preference);
    println!("  {:<16} {}", "Input tokens", plan.input_tokens);
    println!();

    println!("{:<4} {:<28} {:>7} {:>12}  {}", "#", "Model", "Score", "Est. cost", "Rationale");
    println!("{}", "-".repeat(90));
    for (rank, scored) in plan.ranked.iter().enumerate() {
        let marker = if rank < plan.max_attempts { format!("{}", rank + 1) } else { "-".to_string() };
        println!(
            "{:<4} {:<28} {:>7.3} {:>12.6}  {}",
            marker,
            scored.model_id(),
            scored.final_score,
            scored.estimated_cost_usd,
            scored.rationale.dimmed()
        );
    }
    println!();
}
