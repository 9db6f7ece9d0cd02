//! Error types for the routing engine.

use crate::config::ConfigError;
use crate::types::AttemptFailure;
use conduit_abstraction::TaskKind;
use std::fmt;
use thiserror::Error;

/// Why no candidate survived eligibility filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// No registered model supports the task kind.
    UnsupportedTask,
    /// Every capable model would cost more than `max_cost`.
    MaxCost,
    /// Every capable model is slower than `max_latency`.
    MaxLatency,
    /// The input does not fit any capable model's context window.
    ContextWindow,
    /// Capable models exist but each fails a different constraint.
    Constraints,
    /// An explicitly requested model is not registered.
    UnknownModel,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ExclusionReason::UnsupportedTask => "no model supports this task",
            ExclusionReason::MaxCost => "every capable model exceeds max_cost",
            ExclusionReason::MaxLatency => "every capable model exceeds max_latency",
            ExclusionReason::ContextWindow => "input exceeds every capable model's context window",
            ExclusionReason::Constraints => "every capable model violates a constraint",
            ExclusionReason::UnknownModel => "requested model is not registered",
        };
        f.write_str(reason)
    }
}

/// Errors surfaced by the router.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Filtering left no candidate.
    #[error("No eligible model for task '{task}': {reason}")]
    NoEligibleModel {
        /// Task that was requested.
        task: TaskKind,
        /// Why every candidate was excluded.
        reason: ExclusionReason,
    },

    /// Every attempted candidate failed.
    #[error("All providers failed after {} attempt(s): {}", .0.len(), format_failures(.0))]
    AllProvidersFailed(Vec<AttemptFailure>),

    /// A provider rejected its credentials; fallback is not attempted.
    #[error("Provider '{provider}' rejected credentials for model '{model_id}'")]
    Unauthenticated {
        /// Model being invoked.
        model_id: String,
        /// Provider that rejected the call.
        provider: String,
        /// Every attempt made, the rejecting one last.
        attempts: Vec<AttemptFailure>,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled after {} attempt(s)", .attempts.len())]
    Cancelled {
        /// Attempts that completed before cancellation.
        attempts: Vec<AttemptFailure>,
    },

    /// A token count was negative.
    #[error("Invalid token count: input={input}, output={output}")]
    InvalidTokenCount {
        /// Input token count as supplied.
        input: i64,
        /// Output token count as supplied.
        output: i64,
    },

    /// A weight tuple is malformed.
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    /// A preference name is not recognised.
    #[error("Unknown preference profile: {0}")]
    InvalidPreference(String),

    /// A registered candidate's provider has no adapter.
    #[error("No provider adapter registered for '{0}'")]
    MissingProvider(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RoutingError {
    /// Attempt failures carried by this error, if any.
    #[must_use]
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            RoutingError::AllProvidersFailed(failures) => failures,
            RoutingError::Unauthenticated { attempts, .. } | RoutingError::Cancelled { attempts } => {
                attempts
            }
            _ => &[],
        }
    }
}

fn format_failures(failures: &[AttemptFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_abstraction::ErrorKind;

    fn failure(attempt: usize, model_id: &str) -> AttemptFailure {
        AttemptFailure {
            attempt,
            model_id: model_id.to_string(),
            provider: "mock".to_string(),
            kind: ErrorKind::RateLimited,
            message: "slow down".to_string(),
            elapsed_ms: 1.0,
        }
    }

    #[test]
    fn test_all_failed_lists_attempts() {
        let err = RoutingError::AllProvidersFailed(vec![failure(1, "a"), failure(2, "b")]);
        let message = err.to_string();
        assert!(message.starts_with("All providers failed after 2 attempt(s)"));
        assert!(message.contains("attempt 1 on a (mock): rate_limited: slow down"));
        assert!(message.contains("attempt 2 on b"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_no_eligible_display() {
        let err = RoutingError::NoEligibleModel {
            task: TaskKind::Code,
            reason: ExclusionReason::MaxCost,
        };
        assert_eq!(err.to_string(), "No eligible model for task 'code': every capable model exceeds max_cost");
        assert!(err.failures().is_empty());
    }
}
