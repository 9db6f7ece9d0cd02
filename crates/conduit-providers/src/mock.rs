//! Mock provider for testing, demos and development without credentials.

use async_trait::async_trait;
use conduit_abstraction::{
    estimate_tokens, Completion, ErrorKind, Provider, ProviderError, TaskKind, TaskPayload,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Canned responses keyed by task kind. `{topic}` is replaced with the
/// first few words of the input.
fn templates(task: TaskKind) -> &'static [&'static str] {
    match task {
        TaskKind::Summarize => &[
            "This text discusses {topic}. The main takeaway is that several factors need to be weighed before drawing a conclusion.",
            "In summary, the content covers {topic} from several angles and suggests further analysis may be useful.",
        ],
        TaskKind::Sentiment => &[
            r#"{"sentiment": "positive", "confidence": 0.87}"#,
            r#"{"sentiment": "neutral", "confidence": 0.92}"#,
            r#"{"sentiment": "negative", "confidence": 0.78}"#,
        ],
        TaskKind::Rewrite => &[
            "Here is a refined version of {topic} with clearer structure and more precise language.",
        ],
        TaskKind::Code => &[
            "fn solution(input: &[i64]) -> i64 {\n    input.iter().sum()\n}\n\nThis handles {topic} in linear time.",
        ],
        TaskKind::Analysis => &[
            "Analysis of {topic}:\n1. Overview\n2. Key findings\n3. Recommendations",
        ],
        TaskKind::Chat | TaskKind::Tools | TaskKind::Custom => &[
            "I understand your question about {topic}. There are a few points worth considering.",
            "Thanks for bringing up {topic}. The most relevant aspects are context, approach and expected outcome.",
        ],
    }
}

/// A mock implementation of the `Provider` trait.
///
/// Latency is sampled uniformly from a configurable range; a configurable
/// fraction of invocations fail with a configurable error kind. When the
/// sampled latency exceeds the timeout the call gives up at the timeout and
/// reports `ErrorKind::Timeout`.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    min_latency_ms: u64,
    max_latency_ms: u64,
    failure_rate: f64,
    failure_kind: ErrorKind,
    rng: Mutex<StdRng>,
}

impl MockProvider {
    /// Creates a mock provider with 5-20 ms latency and no failures.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_latency_ms: 5,
            max_latency_ms: 20,
            failure_rate: 0.0,
            failure_kind: ErrorKind::TransientTransportError,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Sets the simulated latency range in milliseconds.
    #[must_use]
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_latency_ms = min_ms.min(max_ms);
        self.max_latency_ms = max_ms.max(min_ms);
        self
    }

    /// Sets the fraction of invocations that fail (clamped to 0-1).
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    /// Sets the error kind reported by injected failures.
    #[must_use]
    pub fn with_failure_kind(mut self, kind: ErrorKind) -> Self {
        self.failure_kind = kind;
        self
    }

    /// Makes latency and failure sampling reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Samples (latency, should_fail, template index) under one short lock.
    fn sample(&self, template_count: usize) -> (Duration, bool, usize) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let latency = rng.gen_range(self.min_latency_ms..=self.max_latency_ms);
        let fail = rng.gen_bool(self.failure_rate);
        let index = rng.gen_range(0..template_count.max(1));
        (Duration::from_millis(latency), fail, index)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn invoke(
        &self,
        candidate_id: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let started = Instant::now();
        let choices = templates(payload.task);
        let (latency, fail, index) = self.sample(choices.len());

        debug!(
            provider = %self.name,
            model_id = %candidate_id,
            latency_ms = latency.as_millis() as u64,
            fail,
            "MockProvider invoking"
        );

        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ProviderError::timeout(timeout));
        }
        tokio::time::sleep(latency).await;

        if fail {
            return Err(ProviderError::new(
                self.failure_kind,
                format!("simulated {} failure from {}", self.failure_kind, self.name),
            ));
        }

        let topic = {
            let words: Vec<&str> = payload.text.split_whitespace().take(5).collect();
            words.join(" ")
        };
        let mut text = choices[index].replace("{topic}", &topic);
        if let Some(max_tokens) = payload.max_tokens {
            let max_words = (f64::from(max_tokens) / conduit_abstraction::TOKENS_PER_WORD) as usize;
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.len() > max_words {
                text = words[..max_words].join(" ");
            }
        }

        let mut input_tokens = estimate_tokens(&payload.text);
        if let Some(system) = &payload.system_prompt {
            input_tokens += estimate_tokens(system);
        }
        let output_tokens = estimate_tokens(&text);

        Ok(Completion {
            text,
            input_tokens,
            output_tokens,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_succeeds_without_failures() {
        let provider = MockProvider::new("mock").with_latency(0, 1).with_seed(7);
        let payload = TaskPayload::new(TaskKind::Summarize, "the quick brown fox jumps over the dog");
        let completion = provider
            .invoke("mock/default", &payload, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(completion.text.contains("the quick brown fox jumps"));
        assert_eq!(completion.input_tokens, estimate_tokens(&payload.text));
        assert!(completion.output_tokens > 0);
    }

    #[tokio::test]
    async fn test_mock_always_fails_at_full_rate() {
        let provider = MockProvider::new("flaky")
            .with_latency(0, 1)
            .with_failure_rate(1.0)
            .with_failure_kind(ErrorKind::RateLimited);
        let payload = TaskPayload::new(TaskKind::Chat, "hello");

        let err = provider.invoke("flaky/1", &payload, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_mock_times_out_when_slower_than_timeout() {
        let provider = MockProvider::new("slow").with_latency(200, 200);
        let payload = TaskPayload::new(TaskKind::Chat, "hello");

        let err = provider
            .invoke("slow/1", &payload, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_mock_respects_max_tokens() {
        let provider = MockProvider::new("mock").with_latency(0, 0);
        let mut payload = TaskPayload::new(TaskKind::Analysis, "quarterly revenue by region");
        payload.max_tokens = Some(3);

        let completion = provider.invoke("mock/default", &payload, Duration::from_secs(1)).await.unwrap();
        assert!(completion.text.split_whitespace().count() <= 2);
    }

    #[test]
    fn test_latency_range_is_normalised() {
        let provider = MockProvider::new("mock").with_latency(50, 10);
        assert_eq!(provider.min_latency_ms, 10);
        assert_eq!(provider.max_latency_ms, 50);
    }
}
