//! Command implementations for the Conduit CLI.

pub mod check;
pub mod estimate;
pub mod models;
pub mod route;
pub mod simulate;
pub mod types;

use anyhow::{Context, Result, bail};
use conduit_providers::{MockProvider, ProviderSet};
use conduit_router::{JsonlWriter, OutcomeSink, Router, RouterConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use types::FailureInjection;

/// JSON-lines outcome log fed by a router sink.
///
/// The writer drains until every router holding the sink is dropped, so
/// drop the router before calling [`OutcomeLog::finish`].
pub struct OutcomeLog {
    path: PathBuf,
    writer: JoinHandle<std::io::Result<u64>>,
}

impl OutcomeLog {
    /// Opens a log at `path` buffering up to `capacity` outcomes.
    pub fn open(path: &Path, capacity: usize) -> (Arc<dyn OutcomeSink>, Self) {
        let (sink, writer) = JsonlWriter::channel(path, capacity);
        (Arc::new(sink), Self { path: path.to_path_buf(), writer })
    }

    /// Waits for the writer to drain and returns the number of lines written.
    pub async fn finish(self) -> Result<u64> {
        let written = self
            .writer
            .await
            .context("Outcome log writer stopped unexpectedly")?
            .with_context(|| format!("Failed to write outcome log {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), written, "Outcome log flushed");
        Ok(written)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a router whose providers are all mock adapters.
///
/// Each failure injection applies to the named provider; naming a provider
/// the catalog does not use is an error. Outcomes also go to `sink` when set.
pub fn mock_router(
    config: RouterConfig,
    failures: &[FailureInjection],
    seed: Option<u64>,
    sink: Option<Arc<dyn OutcomeSink>>,
) -> Result<Router> {
    let registry = config.registry().context("Invalid model catalog")?;

    for failure in failures {
        if !registry.providers().contains(&failure.provider.as_str()) {
            bail!(
                "Unknown provider '{}' in --fail. Known providers: {}",
                failure.provider,
                registry.providers().join(", ")
            );
        }
    }

    let mut providers = ProviderSet::new();
    for (i, name) in registry.providers().into_iter().enumerate() {
        let mut adapter = MockProvider::new(name);
        if let Some(failure) = failures.iter().rev().find(|f| f.provider == name) {
            adapter = adapter.with_failure_rate(failure.rate);
        }
        if let Some(seed) = seed {
            adapter = adapter.with_seed(seed.wrapping_add(i as u64));
        }
        providers.insert(Arc::new(adapter));
    }

    let mut builder = Router::builder().config(config).registry(registry).providers(providers);
    if let Some(sink) = sink {
        builder = builder.sink(sink);
    }
    builder.build().context("Failed to build router")
}
