//! Models command implementation.

use crate::config;
use anyhow::{Context, Result};
use colored::Colorize;
use conduit_router::{ModelCandidate, TaskKind};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Execute the models command.
pub fn execute(config_path: Option<&Path>, task: Option<TaskKind>, json_output: bool) -> Result<()> {
    let config = config::load(config_path)?;
    let registry = config.registry().context("Invalid model catalog")?;
    let models: Vec<Arc<ModelCandidate>> = match task {
        Some(task) => registry.for_task(task),
        None => registry.iter().cloned().collect(),
    };

    if json_output {
        let list: Vec<_> = models
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "provider": m.provider,
                    "tasks": m.tasks,
                    "max_input_tokens": m.max_input_tokens,
                    "max_output_tokens": m.max_output_tokens,
                    "input_price_per_1k": m.price_per_1k_input,
                    "output_price_per_1k": m.price_per_1k_output,
                    "latency_ms": m.baseline_latency_ms,
                    "quality": m.baseline_quality,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!();
    let title = match task {
        Some(task) => format!("Models for {task} ({})", models.len()),
        None => format!("Models ({})", models.len()),
    };
    println!("{}", title.bold().cyan());
    println!();

    if models.is_empty() {
        println!("  {}", "No models support this task.".dimmed());
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:>10} {:>10} {:>8} {:>7}  {}",
        "ID", "Provider", "In/1K", "Out/1K", "Latency", "Quality", "Tasks"
    );
    println!("{}", "-".repeat(100));
    for m in &models {
        let tasks: Vec<&str> = m.tasks.iter().map(TaskKind::as_str).collect();
        println!(
            "{:<28} {:<10} {:>10.5} {:>10.5} {:>6}ms {:>7.2}  {}",
            m.id,
            m.provider,
            m.price_per_1k_input,
            m.price_per_1k_output,
            m.baseline_latency_ms,
            m.baseline_quality,
            tasks.join(", ").dimmed()
        );
    }
    println!();
    Ok(())
}
