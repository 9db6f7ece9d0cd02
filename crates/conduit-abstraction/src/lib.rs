//! Provider abstraction layer for Conduit.
//!
//! This crate defines the uniform "invoke" capability the router consumes,
//! the closed set of failure kinds a provider may report, and the task
//! vocabulary shared by every other crate in the workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Kind of text-generation work a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Condense a text into its key points.
    Summarize,
    /// Classify the sentiment of a text.
    Sentiment,
    /// Rewrite a text for clarity or tone.
    Rewrite,
    /// Tool-use / function-calling style requests.
    Tools,
    /// General conversation.
    Chat,
    /// Code generation and review.
    Code,
    /// Long-form analysis.
    Analysis,
    /// Anything else.
    Custom,
}

impl TaskKind {
    /// Every task kind, in declaration order.
    pub const ALL: [TaskKind; 8] = [
        TaskKind::Summarize,
        TaskKind::Sentiment,
        TaskKind::Rewrite,
        TaskKind::Tools,
        TaskKind::Chat,
        TaskKind::Code,
        TaskKind::Analysis,
        TaskKind::Custom,
    ];

    /// Lowercase wire name of the task kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summarize => "summarize",
            TaskKind::Sentiment => "sentiment",
            TaskKind::Rewrite => "rewrite",
            TaskKind::Tools => "tools",
            TaskKind::Chat => "chat",
            TaskKind::Code => "code",
            TaskKind::Analysis => "analysis",
            TaskKind::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown task kind: {s}"))
    }
}

/// Closed set of failure kinds a provider may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The invocation did not finish within its timeout.
    Timeout,
    /// The provider throttled the request.
    RateLimited,
    /// Credentials were rejected.
    Unauthenticated,
    /// Connection reset, DNS failure, 5xx and similar.
    TransientTransportError,
    /// The model declined to produce an answer.
    ModelRefused,
}

impl ErrorKind {
    /// Whether the router may move on to the next candidate after this failure.
    ///
    /// Credential failures are surfaced immediately instead.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Unauthenticated)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::TransientTransportError => "transient_transport_error",
            ErrorKind::ModelRefused => "model_refused",
        };
        f.write_str(name)
    }
}

/// An error reported by a provider invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Provider-supplied detail.
    pub message: String,
}

impl ProviderError {
    /// Creates a new provider error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Shorthand for a timeout error.
    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("no response within {} ms", after.as_millis()))
    }
}

/// The work handed to a provider for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Task kind the request was routed for.
    pub task: TaskKind,
    /// Raw user input.
    pub text: String,
    /// System prompt to prepend.
    pub system_prompt: Option<String>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl TaskPayload {
    /// Creates a payload with no generation overrides.
    pub fn new(task: TaskKind, text: impl Into<String>) -> Self {
        Self { task, text: text.into(), system_prompt: None, max_tokens: None, temperature: None }
    }
}

/// A successful provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Tokens billed on input.
    pub input_tokens: u32,
    /// Tokens billed on output.
    pub output_tokens: u32,
    /// Latency as measured by the provider.
    pub latency_ms: f64,
}

impl Completion {
    /// Total tokens billed.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Approximate tokens per whitespace-delimited word.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Rough token estimate used before a provider reports real usage.
///
/// Non-empty text always estimates to at least one token.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    ((words as f64 * TOKENS_PER_WORD).ceil() as u32).max(1)
}

/// The uniform invocation capability every vendor integration implements.
///
/// Implementations must be `Send + Sync` so one adapter can serve many
/// concurrent routing flows.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Invokes `candidate_id` with the given payload.
    ///
    /// `timeout` is advisory for the adapter; the router enforces it as well.
    ///
    /// # Errors
    /// Returns a `ProviderError` carrying one of the closed `ErrorKind`s.
    async fn invoke(
        &self,
        candidate_id: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<Completion, ProviderError>;

    /// Name of the provider this adapter serves (e.g. "openai").
    fn name(&self) -> &str;
}
