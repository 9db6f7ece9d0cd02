//! Provider implementations for Conduit.
//!
//! This crate provides concrete implementations of the `Provider` trait and
//! the `ProviderSet` the router uses to find the adapter for a candidate.
//!
//! # Supported Providers
//!
//! - **Mock**: testing, demos and load simulation
//!
//! Vendor wire clients plug in by implementing `conduit_abstraction::Provider`.

pub mod mock;

use conduit_abstraction::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub use mock::MockProvider;

/// Adapters keyed by the provider name they serve.
#[derive(Clone, Default)]
pub struct ProviderSet {
    adapters: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with a default `MockProvider` for every name given.
    pub fn mock_for<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new();
        for name in names {
            set.insert(Arc::new(MockProvider::new(name)));
        }
        set
    }

    /// Registers an adapter under its own `name()`, replacing any previous one.
    pub fn insert(&mut self, adapter: Arc<dyn Provider>) {
        let name = adapter.name().to_string();
        debug!(provider = %name, "Registering provider adapter");
        self.adapters.insert(name, adapter);
    }

    /// Registers an adapter under an explicit provider name.
    pub fn insert_as(&mut self, name: impl Into<String>, adapter: Arc<dyn Provider>) {
        self.adapters.insert(name.into(), adapter);
    }

    /// Looks up the adapter serving `provider`.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&Arc<dyn Provider>> {
        self.adapters.get(provider)
    }

    /// Whether an adapter is registered for `provider`.
    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet").field("providers", &self.names()).finish()
    }
}
