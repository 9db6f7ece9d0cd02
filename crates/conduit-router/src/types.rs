//! Types for the routing engine.

use crate::cost::CostBreakdown;
use crate::error::RoutingError;
use chrono::{DateTime, Utc};
use conduit_abstraction::{ErrorKind, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Weights over the four scoring axes. Always sums to 1.0 within `EPSILON`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    /// Weight for the cost score.
    pub cost: f64,
    /// Weight for the latency score.
    pub latency: f64,
    /// Weight for the quality score.
    pub quality: f64,
    /// Weight for the availability score.
    pub availability: f64,
}

impl ScoreWeights {
    /// Tolerance for the weight-sum check.
    pub const EPSILON: f64 = 1e-9;

    /// Creates a weight tuple, rejecting negative, non-finite or non-normalised weights.
    ///
    /// # Errors
    /// Returns `RoutingError::InvalidWeights` when the tuple is malformed.
    pub fn new(cost: f64, latency: f64, quality: f64, availability: f64) -> Result<Self, RoutingError> {
        let weights = Self { cost, latency, quality, availability };
        if [cost, latency, quality, availability]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0 || *w > 1.0)
        {
            return Err(RoutingError::InvalidWeights(format!(
                "each weight must be within [0, 1], got {weights:?}"
            )));
        }
        if (weights.sum() - 1.0).abs() > Self::EPSILON {
            return Err(RoutingError::InvalidWeights(format!(
                "weights must sum to 1.0, got {:.6}",
                weights.sum()
            )));
        }
        Ok(weights)
    }

    /// Sum of all four weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.cost + self.latency + self.quality + self.availability
    }

    /// Weighted sum of component scores, clamped to [0, 1].
    #[must_use]
    pub fn combine(&self, cost: f64, latency: f64, quality: f64, availability: f64) -> f64 {
        let score = self.cost * cost
            + self.latency * latency
            + self.quality * quality
            + self.availability * availability;
        score.clamp(0.0, 1.0)
    }
}

/// Named weighting policy over the scoring axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceProfile {
    /// Prioritise latency.
    Fast,
    /// Prioritise cost.
    Cheap,
    /// Prioritise quality.
    Best,
    /// Balance all factors.
    #[default]
    Balanced,
}

const FAST_WEIGHTS: ScoreWeights = ScoreWeights { cost: 0.1, latency: 0.6, quality: 0.2, availability: 0.1 };
const CHEAP_WEIGHTS: ScoreWeights = ScoreWeights { cost: 0.6, latency: 0.2, quality: 0.1, availability: 0.1 };
const BEST_WEIGHTS: ScoreWeights = ScoreWeights { cost: 0.1, latency: 0.1, quality: 0.6, availability: 0.2 };
const BALANCED_WEIGHTS: ScoreWeights =
    ScoreWeights { cost: 0.25, latency: 0.25, quality: 0.35, availability: 0.15 };

impl PreferenceProfile {
    /// Every profile, in declaration order.
    pub const ALL: [PreferenceProfile; 4] = [
        PreferenceProfile::Fast,
        PreferenceProfile::Cheap,
        PreferenceProfile::Best,
        PreferenceProfile::Balanced,
    ];

    /// Fixed weight tuple for this profile.
    #[must_use]
    pub const fn weights(&self) -> ScoreWeights {
        match self {
            PreferenceProfile::Fast => FAST_WEIGHTS,
            PreferenceProfile::Cheap => CHEAP_WEIGHTS,
            PreferenceProfile::Best => BEST_WEIGHTS,
            PreferenceProfile::Balanced => BALANCED_WEIGHTS,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceProfile::Fast => "fast",
            PreferenceProfile::Cheap => "cheap",
            PreferenceProfile::Best => "best",
            PreferenceProfile::Balanced => "balanced",
        }
    }

    /// What the profile optimises for, used in rationale strings.
    #[must_use]
    pub fn focus(&self) -> &'static str {
        match self {
            PreferenceProfile::Fast => "speed",
            PreferenceProfile::Cheap => "cost",
            PreferenceProfile::Best => "quality",
            PreferenceProfile::Balanced => "a balance of cost, speed and quality",
        }
    }
}

impl fmt::Display for PreferenceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceProfile {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(PreferenceProfile::Fast),
            "cheap" => Ok(PreferenceProfile::Cheap),
            "best" => Ok(PreferenceProfile::Best),
            "balanced" => Ok(PreferenceProfile::Balanced),
            other => Err(RoutingError::InvalidPreference(other.to_string())),
        }
    }
}

/// Price per 1000 tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// USD per 1000 input tokens.
    pub input_per_1k: f64,
    /// USD per 1000 output tokens.
    pub output_per_1k: f64,
}

/// One routable (model, provider) pair. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Model identifier passed to the provider.
    pub id: String,
    /// Name of the provider that serves this model.
    pub provider: String,
    /// Task kinds this model supports.
    pub tasks: BTreeSet<TaskKind>,
    /// Context window available for input.
    pub max_input_tokens: u32,
    /// Maximum tokens the model will generate.
    pub max_output_tokens: u32,
    /// USD per 1000 input tokens.
    #[serde(rename = "input_price_per_1k")]
    pub price_per_1k_input: f64,
    /// USD per 1000 output tokens.
    #[serde(rename = "output_price_per_1k")]
    pub price_per_1k_output: f64,
    /// Expected latency in milliseconds.
    #[serde(rename = "latency_ms")]
    pub baseline_latency_ms: u64,
    /// Curated static quality score (0-1).
    #[serde(rename = "quality")]
    pub baseline_quality: f64,
}

impl ModelCandidate {
    /// Creates a candidate with the given pricing, latency and quality.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        tasks: impl IntoIterator<Item = TaskKind>,
        max_input_tokens: u32,
        max_output_tokens: u32,
        pricing: Pricing,
        baseline_latency_ms: u64,
        baseline_quality: f64,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            tasks: tasks.into_iter().collect(),
            max_input_tokens,
            max_output_tokens,
            price_per_1k_input: pricing.input_per_1k,
            price_per_1k_output: pricing.output_per_1k,
            baseline_latency_ms,
            baseline_quality,
        }
    }

    /// Whether this candidate can serve `task`.
    #[must_use]
    pub fn supports(&self, task: TaskKind) -> bool {
        self.tasks.contains(&task)
    }

    /// Pricing for this candidate.
    #[must_use]
    pub fn pricing(&self) -> Pricing {
        Pricing { input_per_1k: self.price_per_1k_input, output_per_1k: self.price_per_1k_output }
    }
}

/// Hard per-request limits applied before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestConstraints {
    /// Task kind being routed.
    pub task: TaskKind,
    /// Maximum acceptable cost in USD.
    pub max_cost_usd: Option<f64>,
    /// Maximum acceptable baseline latency in milliseconds.
    pub max_latency_ms: Option<u64>,
}

impl RequestConstraints {
    /// Constraints with no cost or latency limit.
    #[must_use]
    pub fn for_task(task: TaskKind) -> Self {
        Self { task, max_cost_usd: None, max_latency_ms: None }
    }
}

/// A text-generation request as it enters the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Client-supplied id; generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Task kind.
    #[serde(default = "default_task")]
    pub task: TaskKind,
    /// Weighting policy; the configured default when absent.
    #[serde(default)]
    pub preference: Option<PreferenceProfile>,
    /// Raw input text.
    pub text: String,
    /// Maximum acceptable cost in USD.
    #[serde(default)]
    pub max_cost_usd: Option<f64>,
    /// Maximum acceptable latency in milliseconds.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Force a specific model, bypassing scoring and fallback.
    #[serde(default)]
    pub model_override: Option<String>,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Custom system prompt; a per-task default is used otherwise.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_task() -> TaskKind {
    TaskKind::Chat
}

impl RouteRequest {
    /// Creates a request with the default profile and no limits.
    pub fn new(task: TaskKind, text: impl Into<String>) -> Self {
        Self {
            request_id: None,
            task,
            preference: None,
            text: text.into(),
            max_cost_usd: None,
            max_latency_ms: None,
            model_override: None,
            max_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }

    /// Sets the preference profile.
    #[must_use]
    pub fn with_preference(mut self, preference: PreferenceProfile) -> Self {
        self.preference = Some(preference);
        self
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the maximum acceptable cost.
    #[must_use]
    pub fn with_max_cost(mut self, usd: f64) -> Self {
        self.max_cost_usd = Some(usd);
        self
    }

    /// Sets the maximum acceptable latency.
    #[must_use]
    pub fn with_max_latency(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    /// Forces a specific model.
    #[must_use]
    pub fn with_model_override(mut self, model_id: impl Into<String>) -> Self {
        self.model_override = Some(model_id.into());
        self
    }

    /// Hard constraints carried by this request.
    #[must_use]
    pub fn constraints(&self) -> RequestConstraints {
        RequestConstraints {
            task: self.task,
            max_cost_usd: self.max_cost_usd,
            max_latency_ms: self.max_latency_ms,
        }
    }
}

/// Default system prompt for a task kind.
#[must_use]
pub fn default_system_prompt(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Summarize => "You are a skilled summarizer. Provide clear, concise summaries that capture the key points.",
        TaskKind::Sentiment => "You are a sentiment analyzer. Return a JSON object with 'sentiment' (positive/negative/neutral) and 'confidence' (0-1).",
        TaskKind::Rewrite => "You are a professional editor. Rewrite the given text to improve clarity and flow while preserving its meaning.",
        TaskKind::Tools => "You are an assistant with tool-use capabilities. Determine the appropriate actions for the request.",
        TaskKind::Code => "You are an expert programmer. Provide clean, efficient, well-documented code.",
        TaskKind::Analysis => "You are a data analyst. Provide thorough analysis with clear structure and actionable conclusions.",
        TaskKind::Chat => "You are a helpful assistant. Provide clear, accurate and helpful responses.",
        TaskKind::Custom => "You are a versatile assistant. Complete the requested task effectively.",
    }
}

/// A candidate with its per-request component and final scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    /// The candidate being scored.
    pub candidate: Arc<ModelCandidate>,
    /// Position among the eligible candidates (registration order), the last tie-breaker.
    pub registration_index: usize,
    /// Estimated cost of this request on this candidate.
    pub estimated_cost_usd: f64,
    /// 1 - normalised estimated cost.
    pub cost_score: f64,
    /// 1 - normalised baseline latency.
    pub latency_score: f64,
    /// Static baseline quality.
    pub quality_score: f64,
    /// Availability of the owning provider.
    pub availability_score: f64,
    /// Weighted final score in [0, 1].
    pub final_score: f64,
    /// Human-readable explanation of the score.
    pub rationale: String,
}

impl ScoredCandidate {
    /// Model id of the scored candidate.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.candidate.id
    }

    /// Provider of the scored candidate.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.candidate.provider
    }
}

/// One failed invocation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// 1-based attempt number within the request.
    pub attempt: usize,
    /// Model that was invoked.
    pub model_id: String,
    /// Provider that served it.
    pub provider: String,
    /// Failure kind.
    pub kind: ErrorKind,
    /// Failure detail.
    pub message: String,
    /// Time spent on the attempt.
    pub elapsed_ms: f64,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {} on {} ({}): {}: {}",
            self.attempt, self.model_id, self.provider, self.kind, self.message
        )
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens.
    pub input_tokens: u32,
    /// Output tokens.
    pub output_tokens: u32,
    /// Input + output.
    pub total_tokens: u64,
}

/// Where the time of one request went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    /// End-to-end time inside the router.
    pub total_ms: f64,
    /// Eligibility filtering and scoring.
    pub routing_ms: f64,
    /// Sum of all invocation attempts.
    pub invocation_ms: f64,
    /// Everything else (bookkeeping, outcome recording).
    pub overhead_ms: f64,
    /// Latency reported by the winning provider.
    pub provider_ms: f64,
}

/// The explained result of routing one request.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    /// Request id (client-supplied or generated).
    pub request_id: String,
    /// Task kind routed.
    pub task: TaskKind,
    /// Profile used for scoring.
    pub preference: PreferenceProfile,
    /// Candidate that served the request.
    pub selected: ScoredCandidate,
    /// Every eligible candidate, in the order they would have been tried.
    pub considered: Vec<ScoredCandidate>,
    /// Attempts that failed before the selected one succeeded.
    pub failures: Vec<AttemptFailure>,
    /// Generated text.
    pub text: String,
    /// Token counts.
    pub usage: TokenUsage,
    /// Cost of the successful invocation.
    pub cost: CostBreakdown,
    /// Latency breakdown.
    pub latency: LatencyBreakdown,
    /// When the decision was finalised.
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    /// Ids of the considered candidates other than the selected one.
    #[must_use]
    pub fn alternatives(&self) -> Vec<&str> {
        self.considered
            .iter()
            .map(ScoredCandidate::model_id)
            .filter(|id| *id != self.selected.model_id())
            .collect()
    }

    /// Whether a fallback candidate served the request.
    #[must_use]
    pub fn fallback_used(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Rationale for the selection, noting any fallback.
    #[must_use]
    pub fn rationale(&self) -> String {
        if self.failures.is_empty() {
            self.selected.rationale.clone()
        } else {
            format!(
                "{} (fallback after {} failed attempt{})",
                self.selected.rationale,
                self.failures.len(),
                if self.failures.len() == 1 { "" } else { "s" }
            )
        }
    }
}

/// Ranking for a request computed without invoking any provider.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingPlan {
    /// Task kind routed.
    pub task: TaskKind,
    /// Profile used for scoring.
    pub preference: PreferenceProfile,
    /// Estimated input tokens, system prompt included.
    pub input_tokens: u32,
    /// Attempt budget; only the first `max_attempts` candidates would be tried.
    pub max_attempts: usize,
    /// Eligible candidates, best first, with their estimated costs.
    pub ranked: Vec<ScoredCandidate>,
}

impl RoutingPlan {
    /// Candidate a live request would try first.
    #[must_use]
    pub fn selected(&self) -> Option<&ScoredCandidate> {
        self.ranked.first()
    }

    /// Candidates that would actually be invoked, in order.
    #[must_use]
    pub fn attempt_order(&self) -> &[ScoredCandidate] {
        &self.ranked[..self.ranked.len().min(self.max_attempts)]
    }
}
