//! Router configuration discovery for the CLI.

use anyhow::{Context, Result};
use conduit_router::{RouterConfig, RouterConfigLoader};
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "CONDUIT_CONFIG";

/// File looked up in the working directory.
pub const LOCAL_CONFIG: &str = "conduit.toml";

/// Resolves which configuration file to use, if any.
///
/// Precedence:
/// 1. `--config` argument
/// 2. `CONDUIT_CONFIG` environment variable
/// 3. `./conduit.toml`
/// 4. `~/.conduit/config.toml`
///
/// Explicit paths (1 and 2) are returned even when missing so that loading
/// reports the error; discovered paths are only returned when they exist.
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    dirs::home_dir().map(|home| home.join(".conduit").join("config.toml")).filter(|p| p.is_file())
}

/// Loads the router configuration, falling back to defaults.
pub fn load(explicit: Option<&Path>) -> Result<RouterConfig> {
    match resolve_path(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading router configuration");
            RouterConfigLoader::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Ok(RouterConfig::default()),
    }
}
