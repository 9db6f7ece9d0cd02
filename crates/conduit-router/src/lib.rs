//! Routing engine for Conduit.
//!
//! Decides, per request, which of several interchangeable language models
//! should serve it and executes that decision with bounded fallback:
//!
//! 1. [`CandidateRegistry`] filters models by task and hard constraints.
//! 2. [`Scorer`] ranks the survivors using cost, latency, quality and the
//!    availability reported by the [`HealthTracker`].
//! 3. [`Router`] invokes the ranked candidates in order until one succeeds
//!    or the attempt budget runs out, then records the [`Outcome`] with the
//!    [`MetricsAggregator`] and any configured [`OutcomeSink`].

pub mod config;
pub mod cost;
pub mod error;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod scorer;
pub mod sink;
pub mod types;

pub use config::{
    ConfigError, HealthSettings, MetricsSettings, RouterConfig, RouterConfigLoader, RoutingSettings, ScoringSettings,
};
pub use cost::{CostBreakdown, CostComparison};
pub use error::{ExclusionReason, RoutingError};
pub use health::{AvailabilitySnapshot, HealthState, HealthTracker, ProviderHealth};
pub use metrics::{MetricsAggregator, MetricsSnapshot, Outcome, ProviderStatus};
pub use registry::CandidateRegistry;
pub use router::{Router, RouterBuilder};
pub use scorer::Scorer;
pub use sink::{ChannelSink, JsonlWriter, OutcomeSink};
pub use types::{
    AttemptFailure, LatencyBreakdown, ModelCandidate, PreferenceProfile, Pricing, RequestConstraints, RouteRequest,
    RoutingDecision, RoutingPlan, ScoreWeights, ScoredCandidate, TokenUsage,
};

pub use conduit_abstraction::{ErrorKind, TaskKind};
