//! Config-check command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use conduit_router::RouterConfigLoader;
use std::path::Path;

/// Execute the config-check command.
pub fn execute(path: &Path) -> Result<()> {
    let config = RouterConfigLoader::load(path).with_context(|| format!("Invalid configuration: {}", path.display()))?;
    let registry = config.registry().with_context(|| format!("Invalid model catalog: {}", path.display()))?;

    let catalog = if config.models.is_empty() { "built-in" } else { "custom" };
    println!("{} {}", "Configuration valid:".green().bold(), path.display());
    println!("  {} models ({catalog} catalog)", registry.len());
    println!("  providers: {}", registry.providers().join(", "));
    println!("  default preference: {}", config.routing.preference());
    println!(
        "  max attempts: {}, worst-case invocation time: {:.1}s",
        config.routing.max_attempts,
        config.routing.worst_case_invocation_time().as_secs_f64()
    );
    Ok(())
}
