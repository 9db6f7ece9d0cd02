//! The routing entry point: filter, score, invoke, fall back.

use crate::config::{RouterConfig, RouterConfigLoader, RoutingSettings, ScoringSettings};
use crate::cost::{self, CostBreakdown};
use crate::error::{Result, RoutingError};
use crate::health::{HealthTracker, ProviderHealth};
use crate::metrics::{MetricsAggregator, MetricsSnapshot, Outcome};
use crate::registry::CandidateRegistry;
use crate::scorer::Scorer;
use crate::sink::OutcomeSink;
use crate::types::{
    default_system_prompt, AttemptFailure, LatencyBreakdown, PreferenceProfile, RouteRequest, RoutingDecision,
    RoutingPlan, ScoredCandidate, TokenUsage,
};
use chrono::Utc;
use conduit_abstraction::{estimate_tokens, Completion, ErrorKind, Provider, ProviderError, TaskPayload};
use conduit_providers::ProviderSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Generates a request id of the form `req_<12 hex>`.
#[must_use]
pub fn generate_request_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("req_{}", &hex[..12])
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Result of one invocation attempt.
enum Attempt {
    Succeeded(Completion),
    Failed(ProviderError),
    Cancelled,
}

/// Per-request bookkeeping shared by the exit paths.
struct Flight<'a> {
    request_id: String,
    request: &'a RouteRequest,
    preference: PreferenceProfile,
    started: Instant,
    routing_ms: f64,
    invocation_ms: f64,
    failures: Vec<AttemptFailure>,
}

/// Routes text-generation requests across interchangeable models.
///
/// One instance serves many concurrent requests. The registry is read-only,
/// the health tracker synchronises per provider, and outcomes are recorded
/// before `route` returns.
pub struct Router {
    registry: Arc<CandidateRegistry>,
    health: Arc<HealthTracker>,
    metrics: Arc<MetricsAggregator>,
    providers: ProviderSet,
    scorer: Scorer,
    settings: RoutingSettings,
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("candidates", &self.registry.len())
            .field("providers", &self.providers.names())
            .field("settings", &self.settings)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Starts building a router.
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Candidate registry.
    #[must_use]
    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    /// Shared health tracker.
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Shared metrics aggregator.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Attempt and timeout policy.
    #[must_use]
    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    /// Health of every provider that has recorded outcomes.
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<ProviderHealth> {
        self.health.snapshot()
    }

    /// Aggregated outcome metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Upper bound on provider time for one request.
    ///
    /// Attempts run one after another, each capped by its own timeout, so a
    /// request spends at most `min(max_attempts, candidates)` times the
    /// largest per-attempt timeout invoking providers. Filtering, scoring and
    /// outcome recording come on top and are in-memory only.
    #[must_use]
    pub fn worst_case_latency(&self) -> Duration {
        let longest = self
            .registry
            .iter()
            .map(|c| self.settings.attempt_timeout(c.baseline_latency_ms))
            .max()
            .unwrap_or_default();
        let attempts = self.settings.max_attempts.min(self.registry.len());
        longest.saturating_mul(u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    /// Routes one request.
    ///
    /// # Errors
    /// - `NoEligibleModel` when filtering leaves no candidate
    /// - `AllProvidersFailed` when every attempt fails
    /// - `Unauthenticated` when a provider rejects its credentials
    pub async fn route(&self, request: RouteRequest) -> Result<RoutingDecision> {
        self.route_with_cancel(request, CancellationToken::new()).await
    }

    /// Routes one request, abandoning it when `cancel` fires.
    ///
    /// An in-flight attempt abandoned by cancellation is recorded as a
    /// failure for its provider.
    ///
    /// # Errors
    /// As [`Router::route`], plus `Cancelled` when the token fires.
    pub async fn route_with_cancel(&self, request: RouteRequest, cancel: CancellationToken) -> Result<RoutingDecision> {
        let started = Instant::now();
        let request_id = request.request_id.clone().unwrap_or_else(generate_request_id);
        let (preference, system_prompt, input_tokens) = self.prepare(&request);

        let ranked = match self.rank(&request, preference, input_tokens) {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(request_id = %request_id, task = %request.task, error = %e, "Routing failed before invocation");
                return Err(e);
            }
        };

        let mut flight = Flight {
            request_id,
            request: &request,
            preference,
            started,
            routing_ms: millis(started.elapsed()),
            invocation_ms: 0.0,
            failures: Vec::new(),
        };
        debug!(
            request_id = %flight.request_id,
            candidates = ranked.len(),
            top = %ranked[0].model_id(),
            routing_ms = flight.routing_ms,
            "Candidates ranked"
        );

        for (index, scored) in ranked.iter().take(self.settings.max_attempts.max(1)).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let candidate = &scored.candidate;
            let timeout = self.settings.attempt_timeout(candidate.baseline_latency_ms);
            let payload = TaskPayload {
                task: request.task,
                text: request.text.clone(),
                system_prompt: Some(system_prompt.clone()),
                max_tokens: Some(
                    request
                        .max_tokens
                        .map_or(candidate.max_output_tokens, |m| m.min(candidate.max_output_tokens)),
                ),
                temperature: request.temperature,
            };

            let attempt_started = Instant::now();
            let attempt = match self.providers.get(&candidate.provider) {
                Some(adapter) => invoke(adapter.as_ref(), &candidate.id, &payload, timeout, &cancel).await,
                None => Attempt::Failed(ProviderError::new(
                    ErrorKind::TransientTransportError,
                    format!("no adapter for provider '{}'", candidate.provider),
                )),
            };
            let elapsed_ms = millis(attempt_started.elapsed());
            flight.invocation_ms += elapsed_ms;

            let error = match attempt {
                Attempt::Succeeded(completion) => {
                    self.health.record(&candidate.provider, true, elapsed_ms);
                    return self.succeed(flight, scored, &ranked, completion);
                }
                Attempt::Failed(error) => error,
                Attempt::Cancelled => {
                    self.health.record(&candidate.provider, false, elapsed_ms);
                    flight.failures.push(AttemptFailure {
                        attempt: index + 1,
                        model_id: candidate.id.clone(),
                        provider: candidate.provider.clone(),
                        kind: ErrorKind::Timeout,
                        message: "abandoned: request cancelled".to_string(),
                        elapsed_ms,
                    });
                    break;
                }
            };

            self.health.record(&candidate.provider, false, elapsed_ms);
            warn!(
                request_id = %flight.request_id,
                attempt = index + 1,
                model_id = %candidate.id,
                provider = %candidate.provider,
                error = %error,
                "Attempt failed"
            );
            flight.failures.push(AttemptFailure {
                attempt: index + 1,
                model_id: candidate.id.clone(),
                provider: candidate.provider.clone(),
                kind: error.kind,
                message: error.message.clone(),
                elapsed_ms,
            });

            if !error.kind.is_retryable() {
                let err = RoutingError::Unauthenticated {
                    model_id: candidate.id.clone(),
                    provider: candidate.provider.clone(),
                    attempts: std::mem::take(&mut flight.failures),
                };
                return Err(self.fail(&flight, scored, err));
            }
        }

        let last = flight.failures.last().map_or(&ranked[0], |f| {
            ranked.iter().find(|s| s.model_id() == f.model_id).unwrap_or(&ranked[0])
        });
        let err = if cancel.is_cancelled() {
            RoutingError::Cancelled { attempts: std::mem::take(&mut flight.failures) }
        } else {
            RoutingError::AllProvidersFailed(std::mem::take(&mut flight.failures))
        };
        Err(self.fail(&flight, last, err))
    }

    /// Ranks candidates for `request` without invoking anything.
    ///
    /// Uses the same filtering, cost estimate and health snapshot as
    /// [`Router::route`], so the first entry is the candidate a live request
    /// would try first at this moment. Records no outcome.
    ///
    /// # Errors
    /// `NoEligibleModel` when filtering leaves no candidate.
    pub fn plan(&self, request: &RouteRequest) -> Result<RoutingPlan> {
        let (preference, _, input_tokens) = self.prepare(request);
        let ranked = self.rank(request, preference, input_tokens)?;
        Ok(RoutingPlan {
            task: request.task,
            preference,
            input_tokens,
            max_attempts: self.settings.max_attempts.max(1),
            ranked,
        })
    }

    /// Effective preference, system prompt and estimated input tokens.
    fn prepare(&self, request: &RouteRequest) -> (PreferenceProfile, String, u32) {
        let preference = request.preference.unwrap_or_else(|| self.settings.preference());
        let system_prompt = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(request.task).to_string());
        let input_tokens = estimate_tokens(&request.text) + estimate_tokens(&system_prompt);
        (preference, system_prompt, input_tokens)
    }

    /// Eligible candidates for `request`, best first.
    fn rank(
        &self,
        request: &RouteRequest,
        preference: PreferenceProfile,
        input_tokens: u32,
    ) -> Result<Vec<ScoredCandidate>> {
        let candidates = match &request.model_override {
            Some(model_id) => vec![self.registry.resolve_override(model_id, request.task)?],
            None => self.registry.eligible(&request.constraints(), input_tokens)?,
        };
        let costs: Vec<f64> = candidates
            .iter()
            .map(|c| cost::estimate_cost(c, input_tokens, self.settings.expected_output_ratio))
            .collect();
        let availability = self.health.availability_snapshot(candidates.iter().map(|c| c.provider.as_str()));
        Ok(self.scorer.score(&candidates, &costs, &availability, preference))
    }

    fn succeed(
        &self,
        flight: Flight<'_>,
        selected: &ScoredCandidate,
        ranked: &[ScoredCandidate],
        completion: Completion,
    ) -> Result<RoutingDecision> {
        let candidate = &selected.candidate;
        let cost = CostBreakdown::compute(
            i64::from(completion.input_tokens),
            i64::from(completion.output_tokens),
            &candidate.pricing(),
        )?
        .with_savings_against(
            self.registry.most_expensive_cost(completion.input_tokens, completion.output_tokens),
        );
        let usage = TokenUsage {
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            total_tokens: completion.total_tokens(),
        };

        let total_ms = millis(flight.started.elapsed());
        self.emit(Outcome {
            request_id: flight.request_id.clone(),
            model_id: candidate.id.clone(),
            provider: candidate.provider.clone(),
            task: flight.request.task,
            preference: flight.preference,
            success: true,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: cost.total_cost_usd,
            latency_ms: total_ms,
            routing_ms: flight.routing_ms,
            invocation_ms: flight.invocation_ms,
            attempts: flight.failures.len() + 1,
            fallback_used: !flight.failures.is_empty(),
            error: None,
            timestamp: Utc::now(),
        });

        let total_ms = millis(flight.started.elapsed());
        let latency = LatencyBreakdown {
            total_ms,
            routing_ms: flight.routing_ms,
            invocation_ms: flight.invocation_ms,
            overhead_ms: (total_ms - flight.routing_ms - flight.invocation_ms).max(0.0),
            provider_ms: completion.latency_ms,
        };

        info!(
            request_id = %flight.request_id,
            model_id = %candidate.id,
            provider = %candidate.provider,
            preference = %flight.preference,
            attempts = flight.failures.len() + 1,
            score = selected.final_score,
            cost_usd = cost.total_cost_usd,
            total_ms,
            "Request routed"
        );

        Ok(RoutingDecision {
            request_id: flight.request_id,
            task: flight.request.task,
            preference: flight.preference,
            selected: selected.clone(),
            considered: ranked.to_vec(),
            failures: flight.failures,
            text: completion.text,
            usage,
            cost,
            latency,
            timestamp: Utc::now(),
        })
    }

    /// Records a terminal failure and hands back the error.
    fn fail(&self, flight: &Flight<'_>, last: &ScoredCandidate, err: RoutingError) -> RoutingError {
        let attempts = err.failures().len();
        self.emit(Outcome {
            request_id: flight.request_id.clone(),
            model_id: last.model_id().to_string(),
            provider: last.provider().to_string(),
            task: flight.request.task,
            preference: flight.preference,
            success: false,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            latency_ms: millis(flight.started.elapsed()),
            routing_ms: flight.routing_ms,
            invocation_ms: flight.invocation_ms,
            attempts,
            fallback_used: attempts > 1,
            error: Some(err.to_string()),
            timestamp: Utc::now(),
        });
        warn!(request_id = %flight.request_id, attempts, error = %err, "Request failed");
        err
    }

    fn emit(&self, outcome: Outcome) {
        for sink in &self.sinks {
            sink.submit(&outcome);
        }
        self.metrics.record(outcome);
    }
}

/// Invokes one candidate under a timeout, racing caller cancellation.
async fn invoke(
    adapter: &dyn Provider,
    model_id: &str,
    payload: &TaskPayload,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Attempt {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Attempt::Cancelled,
        result = tokio::time::timeout(timeout, adapter.invoke(model_id, payload, timeout)) => match result {
            Ok(Ok(completion)) => Attempt::Succeeded(completion),
            Ok(Err(error)) => Attempt::Failed(error),
            Err(_) => Attempt::Failed(ProviderError::timeout(timeout)),
        },
    }
}

/// Builder for [`Router`].
#[derive(Default)]
pub struct RouterBuilder {
    config: RouterConfig,
    registry: Option<CandidateRegistry>,
    health: Option<Arc<HealthTracker>>,
    metrics: Option<Arc<MetricsAggregator>>,
    providers: ProviderSet,
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl RouterBuilder {
    /// Uses every section of `config`. Explicit components set later win.
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the candidate registry.
    #[must_use]
    pub fn registry(mut self, registry: CandidateRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Shares an existing health tracker.
    #[must_use]
    pub fn health(mut self, health: Arc<HealthTracker>) -> Self {
        self.health = Some(health);
        self
    }

    /// Shares an existing metrics aggregator.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registers an adapter under its own name.
    #[must_use]
    pub fn provider(mut self, adapter: Arc<dyn Provider>) -> Self {
        self.providers.insert(adapter);
        self
    }

    /// Registers an adapter under `name`.
    #[must_use]
    pub fn provider_as(mut self, name: impl Into<String>, adapter: Arc<dyn Provider>) -> Self {
        self.providers.insert_as(name, adapter);
        self
    }

    /// Registers every adapter in `providers`.
    #[must_use]
    pub fn providers(mut self, providers: ProviderSet) -> Self {
        self.providers = providers;
        self
    }

    /// Adds an outcome sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Overrides the attempt and timeout policy.
    #[must_use]
    pub fn settings(mut self, settings: RoutingSettings) -> Self {
        self.config.routing = settings;
        self
    }

    /// Overrides the scoring knobs.
    #[must_use]
    pub fn scoring(mut self, scoring: ScoringSettings) -> Self {
        self.config.scoring = scoring;
        self
    }

    /// Validates and assembles the router.
    ///
    /// # Errors
    /// Returns `RoutingError::Config` for invalid settings and
    /// `RoutingError::MissingProvider` when a registered candidate's
    /// provider has no adapter.
    pub fn build(self) -> Result<Router> {
        RouterConfigLoader::validate(&self.config)?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => self.config.registry()?,
        };

        if let Some(missing) = registry.providers().into_iter().find(|p| !self.providers.contains(p)) {
            return Err(RoutingError::MissingProvider(missing.to_string()));
        }

        Ok(Router {
            registry: Arc::new(registry),
            health: self.health.unwrap_or_else(|| Arc::new(HealthTracker::new(self.config.health.clone()))),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(MetricsAggregator::new(self.config.metrics.clone()))),
            providers: self.providers,
            scorer: Scorer::new(self.config.scoring.clone()),
            settings: self.config.routing,
            sinks: self.sinks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_abstraction::TaskKind;
    use conduit_providers::MockProvider;

    fn mock_router() -> Router {
        Router::builder()
            .providers(ProviderSet::mock_for(CandidateRegistry::builtin().providers()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_build_requires_every_provider() {
        let result = Router::builder().provider(Arc::new(MockProvider::new("openai"))).build();
        assert!(matches!(result, Err(RoutingError::MissingProvider(_))));
    }

    #[test]
    fn test_build_rejects_invalid_settings() {
        let settings = RoutingSettings { max_attempts: 0, ..RoutingSettings::default() };
        let result = Router::builder()
            .providers(ProviderSet::mock_for(CandidateRegistry::builtin().providers()))
            .settings(settings)
            .build();
        assert!(matches!(result, Err(RoutingError::Config(_))));
    }

    #[test]
    fn test_worst_case_latency() {
        let router = mock_router();
        // gpt-4o: 1500 ms x 3.0 = 4.5 s per attempt, three attempts
        assert_eq!(router.worst_case_latency(), Duration::from_millis(13_500));
    }

    #[tokio::test]
    async fn test_route_with_builtin_catalog() {
        let router = mock_router();
        let request = RouteRequest::new(TaskKind::Summarize, "a long report about quarterly revenue")
            .with_preference(PreferenceProfile::Cheap)
            .with_request_id("req_fixed");
        let decision = router.route(request).await.unwrap();

        assert_eq!(decision.request_id, "req_fixed");
        assert_eq!(decision.preference, PreferenceProfile::Cheap);
        assert!(decision.failures.is_empty());
        assert!(!decision.alternatives().is_empty());
        assert!(!decision.text.is_empty());
        assert_eq!(router.metrics().len(), 1);
    }

    #[tokio::test]
    async fn test_model_override_bypasses_scoring() {
        let router = mock_router();
        let request = RouteRequest::new(TaskKind::Code, "write a parser").with_model_override("gpt-4o");
        let decision = router.route(request).await.unwrap();
        assert_eq!(decision.selected.model_id(), "gpt-4o");
        assert_eq!(decision.considered.len(), 1);
        assert!(decision.alternatives().is_empty());
    }

    #[tokio::test]
    async fn test_plan_matches_route_without_recording() {
        let router = mock_router();
        let request = RouteRequest::new(TaskKind::Summarize, "quarterly revenue grew in every region")
            .with_preference(PreferenceProfile::Cheap);

        let plan = router.plan(&request).unwrap();
        assert_eq!(plan.preference, PreferenceProfile::Cheap);
        assert!(plan.input_tokens > 0);
        assert!(plan.ranked.len() > 1);
        assert!(plan.ranked.windows(2).all(|w| w[0].final_score >= w[1].final_score));
        assert!(plan.ranked.iter().all(|c| c.estimated_cost_usd >= 0.0));
        assert_eq!(plan.attempt_order().len(), plan.ranked.len().min(3));
        assert!(router.metrics().is_empty());
        assert!(router.health_snapshot().is_empty());

        let planned = plan.selected().unwrap().model_id().to_string();
        let decision = router.route(request).await.unwrap();
        assert_eq!(decision.selected.model_id(), planned);
    }

    #[test]
    fn test_plan_reports_ineligible_requests() {
        let router = mock_router();
        let override_plan = router.plan(&RouteRequest::new(TaskKind::Code, "x").with_model_override("gpt-4o")).unwrap();
        assert_eq!(override_plan.ranked.len(), 1);

        let unknown = router.plan(&RouteRequest::new(TaskKind::Code, "x").with_model_override("nope"));
        assert!(matches!(
            unknown,
            Err(RoutingError::NoEligibleModel { reason: crate::error::ExclusionReason::UnknownModel, .. })
        ));
    }

    #[tokio::test]
    async fn test_default_preference_from_settings() {
        let settings = RoutingSettings { default_preference: "fast".to_string(), ..RoutingSettings::default() };
        let router = Router::builder()
            .providers(ProviderSet::mock_for(CandidateRegistry::builtin().providers()))
            .settings(settings)
            .build()
            .unwrap();
        let decision = router.route(RouteRequest::new(TaskKind::Chat, "hi there")).await.unwrap();
        assert_eq!(decision.preference, PreferenceProfile::Fast);
    }
}
