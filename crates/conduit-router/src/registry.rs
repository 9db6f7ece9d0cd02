//! Candidate registry: the immutable table of routable models.

use crate::config::ConfigError;
use crate::cost;
use crate::error::{ExclusionReason, Result, RoutingError};
use crate::types::{ModelCandidate, Pricing, RequestConstraints};
use conduit_abstraction::TaskKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tasks served by the general-purpose frontier models.
const GENERAL_TASKS: [TaskKind; 7] = [
    TaskKind::Summarize,
    TaskKind::Sentiment,
    TaskKind::Rewrite,
    TaskKind::Tools,
    TaskKind::Chat,
    TaskKind::Code,
    TaskKind::Analysis,
];

/// Read-only table of model candidates in registration order.
///
/// Never mutated after construction, so it is shared across concurrent
/// requests without locking.
#[derive(Debug, Clone)]
pub struct CandidateRegistry {
    candidates: Vec<Arc<ModelCandidate>>,
    index: HashMap<String, usize>,
}

impl CandidateRegistry {
    /// Builds a registry from candidates in registration order.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for an empty catalog, duplicate ids
    /// or a candidate with out-of-range pricing or quality.
    pub fn new(candidates: Vec<ModelCandidate>) -> std::result::Result<Self, ConfigError> {
        if candidates.is_empty() {
            return Err(ConfigError::Validation("Model catalog must not be empty".to_string()));
        }
        let mut index = HashMap::with_capacity(candidates.len());
        for (position, candidate) in candidates.iter().enumerate() {
            validate_candidate(candidate)?;
            if index.insert(candidate.id.clone(), position).is_some() {
                return Err(ConfigError::Validation(format!("Duplicate model id: {}", candidate.id)));
            }
        }
        Ok(Self { candidates: candidates.into_iter().map(Arc::new).collect(), index })
    }

    /// Registry with the built-in multi-vendor catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let candidates = builtin_catalog();
        let index = candidates.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        Self { candidates: candidates.into_iter().map(Arc::new).collect(), index }
    }

    /// Looks up a candidate by id.
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&Arc<ModelCandidate>> {
        self.index.get(model_id).map(|&i| &self.candidates[i])
    }

    /// Candidates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelCandidate>> {
        self.candidates.iter()
    }

    /// Number of registered candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the registry has no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Distinct provider names, in order of first registration.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for candidate in &self.candidates {
            if !seen.contains(&candidate.provider.as_str()) {
                seen.push(candidate.provider.as_str());
            }
        }
        seen
    }

    /// Candidates supporting `task`, in registration order.
    #[must_use]
    pub fn for_task(&self, task: TaskKind) -> Vec<Arc<ModelCandidate>> {
        self.candidates.iter().filter(|c| c.supports(task)).cloned().collect()
    }

    /// Candidates that can serve a request of `input_tokens` under `constraints`.
    ///
    /// Filters by task support, then context window, then the hard limits:
    /// a candidate is excluded if its minimum achievable cost (input only)
    /// exceeds `max_cost_usd` or its baseline latency exceeds `max_latency_ms`.
    /// The result keeps registration order.
    ///
    /// # Errors
    /// Returns `RoutingError::NoEligibleModel` with the determinable reason
    /// when nothing survives.
    pub fn eligible(
        &self,
        constraints: &RequestConstraints,
        input_tokens: u32,
    ) -> Result<Vec<Arc<ModelCandidate>>> {
        let capable = self.for_task(constraints.task);
        if capable.is_empty() {
            return Err(RoutingError::NoEligibleModel {
                task: constraints.task,
                reason: ExclusionReason::UnsupportedTask,
            });
        }

        let mut eligible = Vec::with_capacity(capable.len());
        let mut reasons = Vec::new();
        for candidate in capable {
            match exclusion(&candidate, constraints, input_tokens) {
                None => eligible.push(candidate),
                Some(reason) => {
                    debug!(model_id = %candidate.id, %reason, "Candidate excluded");
                    reasons.push(reason);
                }
            }
        }

        if eligible.is_empty() {
            let first = reasons[0];
            let reason = if reasons.iter().all(|r| *r == first) { first } else { ExclusionReason::Constraints };
            return Err(RoutingError::NoEligibleModel { task: constraints.task, reason });
        }
        Ok(eligible)
    }

    /// Resolves an explicitly requested model for `task`.
    ///
    /// # Errors
    /// Returns `RoutingError::NoEligibleModel` when the model is unknown or
    /// does not support the task.
    pub fn resolve_override(&self, model_id: &str, task: TaskKind) -> Result<Arc<ModelCandidate>> {
        let candidate = self.get(model_id).ok_or(RoutingError::NoEligibleModel {
            task,
            reason: ExclusionReason::UnknownModel,
        })?;
        if !candidate.supports(task) {
            return Err(RoutingError::NoEligibleModel { task, reason: ExclusionReason::UnsupportedTask });
        }
        Ok(Arc::clone(candidate))
    }

    /// Cost of the given tokens on the most expensive registered model.
    #[must_use]
    pub fn most_expensive_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.candidates
            .iter()
            .filter_map(|c| cost::cost(i64::from(input_tokens), i64::from(output_tokens), &c.pricing()).ok())
            .fold(0.0, f64::max)
    }
}

/// Checks a single candidate's static data.
///
/// # Errors
/// Returns `ConfigError::Validation` naming the offending field.
pub(crate) fn validate_candidate(model: &ModelCandidate) -> std::result::Result<(), ConfigError> {
    if model.id.trim().is_empty() || model.provider.trim().is_empty() {
        return Err(ConfigError::Validation("Model id and provider must be non-empty".to_string()));
    }
    if model.tasks.is_empty() {
        return Err(ConfigError::Validation(format!("Model '{}' must support at least one task", model.id)));
    }
    for (name, price) in [("input", model.price_per_1k_input), ("output", model.price_per_1k_output)] {
        if !(price.is_finite() && price >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "Model '{}': {name} price must be non-negative, got {price}",
                model.id
            )));
        }
    }
    // NaN fails the range check too
    if !(0.0..=1.0).contains(&model.baseline_quality) {
        return Err(ConfigError::Validation(format!(
            "Model '{}': quality must be within [0, 1], got {}",
            model.id, model.baseline_quality
        )));
    }
    Ok(())
}

fn exclusion(
    candidate: &ModelCandidate,
    constraints: &RequestConstraints,
    input_tokens: u32,
) -> Option<ExclusionReason> {
    if input_tokens > candidate.max_input_tokens {
        return Some(ExclusionReason::ContextWindow);
    }
    if let Some(max_cost) = constraints.max_cost_usd {
        if cost::minimum_cost(candidate, input_tokens) > max_cost {
            return Some(ExclusionReason::MaxCost);
        }
    }
    if let Some(max_latency) = constraints.max_latency_ms {
        if candidate.baseline_latency_ms > max_latency {
            return Some(ExclusionReason::MaxLatency);
        }
    }
    None
}

/// Built-in catalog with current list prices per 1000 tokens.
#[must_use]
pub fn builtin_catalog() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate::new(
            "gpt-4o",
            "openai",
            GENERAL_TASKS,
            128_000,
            16_384,
            Pricing { input_per_1k: 0.0025, output_per_1k: 0.01 },
            1500,
            0.95,
        ),
        ModelCandidate::new(
            "gpt-4o-mini",
            "openai",
            [TaskKind::Summarize, TaskKind::Sentiment, TaskKind::Rewrite, TaskKind::Chat, TaskKind::Code],
            128_000,
            16_384,
            Pricing { input_per_1k: 0.000_15, output_per_1k: 0.0006 },
            800,
            0.85,
        ),
        ModelCandidate::new(
            "claude-3-5-sonnet-20241022",
            "anthropic",
            GENERAL_TASKS,
            200_000,
            8192,
            Pricing { input_per_1k: 0.003, output_per_1k: 0.015 },
            1200,
            0.95,
        ),
        ModelCandidate::new(
            "claude-3-5-haiku-20241022",
            "anthropic",
            [TaskKind::Summarize, TaskKind::Sentiment, TaskKind::Rewrite, TaskKind::Chat],
            200_000,
            8192,
            Pricing { input_per_1k: 0.0008, output_per_1k: 0.004 },
            500,
            0.80,
        ),
        ModelCandidate::new(
            "local/sentiment",
            "local",
            [TaskKind::Sentiment],
            512,
            512,
            Pricing { input_per_1k: 0.0, output_per_1k: 0.0 },
            50,
            0.75,
        ),
        ModelCandidate::new(
            "mock/default",
            "mock",
            TaskKind::ALL,
            4096,
            1024,
            Pricing { input_per_1k: 0.0, output_per_1k: 0.0 },
            100,
            0.5,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, tasks: &[TaskKind], input_price: f64, latency_ms: u64) -> ModelCandidate {
        ModelCandidate::new(
            id,
            "p",
            tasks.iter().copied(),
            1000,
            500,
            Pricing { input_per_1k: input_price, output_per_1k: input_price },
            latency_ms,
            0.5,
        )
    }

    fn ids(candidates: &[Arc<ModelCandidate>]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let registry = CandidateRegistry::builtin();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.providers(), ["openai", "anthropic", "local", "mock"]);
        for candidate in registry.iter() {
            assert!((0.0..=1.0).contains(&candidate.baseline_quality));
            assert!(!candidate.tasks.is_empty());
        }
        assert!(CandidateRegistry::new(builtin_catalog()).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = CandidateRegistry::new(vec![model("a", &[TaskKind::Chat], 1.0, 10), model("a", &[TaskKind::Code], 1.0, 10)]);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(CandidateRegistry::new(Vec::new()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_candidates_rejected() {
        let mut nan_quality = model("nan", &[TaskKind::Chat], 1.0, 10);
        nan_quality.baseline_quality = f64::NAN;
        let mut high_quality = model("high", &[TaskKind::Chat], 1.0, 10);
        high_quality.baseline_quality = 1.5;
        let negative_price = model("cheap", &[TaskKind::Chat], -0.1, 10);
        let no_tasks = model("idle", &[], 1.0, 10);

        for bad in [nan_quality, high_quality, negative_price, no_tasks] {
            let id = bad.id.clone();
            let result = CandidateRegistry::new(vec![model("ok", &[TaskKind::Chat], 1.0, 10), bad]);
            match result {
                Err(ConfigError::Validation(message)) => assert!(message.contains(&id), "{message}"),
                other => panic!("expected validation error for {id}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_eligible_keeps_registration_order() {
        let registry = CandidateRegistry::new(vec![
            model("c", &[TaskKind::Chat], 3.0, 10),
            model("x", &[TaskKind::Code], 1.0, 10),
            model("a", &[TaskKind::Chat], 1.0, 10),
        ])
        .unwrap();
        let eligible = registry.eligible(&RequestConstraints::for_task(TaskKind::Chat), 10).unwrap();
        assert_eq!(ids(&eligible), ["c", "a"]);
    }

    #[test]
    fn test_unsupported_task() {
        let registry = CandidateRegistry::new(vec![model("a", &[TaskKind::Chat], 1.0, 10)]).unwrap();
        let err = registry.eligible(&RequestConstraints::for_task(TaskKind::Code), 10).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::NoEligibleModel { task: TaskKind::Code, reason: ExclusionReason::UnsupportedTask }
        ));
    }

    #[test]
    fn test_max_cost_uses_input_only_cost() {
        let registry = CandidateRegistry::new(vec![model("a", &[TaskKind::Chat], 1.0, 10)]).unwrap();
        let mut constraints = RequestConstraints::for_task(TaskKind::Chat);

        // 500 input tokens at 1.0/1K is 0.5 before any output
        constraints.max_cost_usd = Some(0.5);
        assert!(registry.eligible(&constraints, 500).is_ok());

        constraints.max_cost_usd = Some(0.49);
        let err = registry.eligible(&constraints, 500).unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleModel { reason: ExclusionReason::MaxCost, .. }));
    }

    #[test]
    fn test_max_latency_and_mixed_reasons() {
        let registry = CandidateRegistry::new(vec![
            model("slow", &[TaskKind::Chat], 0.0, 900),
            model("pricey", &[TaskKind::Chat], 10.0, 10),
        ])
        .unwrap();
        let constraints = RequestConstraints { task: TaskKind::Chat, max_cost_usd: Some(0.01), max_latency_ms: Some(100) };
        let err = registry.eligible(&constraints, 100).unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleModel { reason: ExclusionReason::Constraints, .. }));

        let latency_only = RequestConstraints { task: TaskKind::Chat, max_cost_usd: None, max_latency_ms: Some(5) };
        let err = registry.eligible(&latency_only, 100).unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleModel { reason: ExclusionReason::MaxLatency, .. }));
    }

    #[test]
    fn test_context_window_excludes() {
        let registry = CandidateRegistry::new(vec![model("small", &[TaskKind::Chat], 0.0, 10)]).unwrap();
        let err = registry.eligible(&RequestConstraints::for_task(TaskKind::Chat), 1001).unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleModel { reason: ExclusionReason::ContextWindow, .. }));
    }

    #[test]
    fn test_resolve_override() {
        let registry = CandidateRegistry::builtin();
        assert_eq!(registry.resolve_override("gpt-4o", TaskKind::Code).unwrap().id, "gpt-4o");
        assert!(matches!(
            registry.resolve_override("nope", TaskKind::Code),
            Err(RoutingError::NoEligibleModel { reason: ExclusionReason::UnknownModel, .. })
        ));
        assert!(matches!(
            registry.resolve_override("local/sentiment", TaskKind::Code),
            Err(RoutingError::NoEligibleModel { reason: ExclusionReason::UnsupportedTask, .. })
        ));
    }

    #[test]
    fn test_most_expensive_cost() {
        let registry = CandidateRegistry::builtin();
        // claude-3-5-sonnet is the priciest per output token
        let expected = 1.0 * 0.003 + 1.0 * 0.015;
        assert!((registry.most_expensive_cost(1000, 1000) - expected).abs() < 1e-12);
    }
}
