//! Rolling-window metrics over request outcomes.

use crate::config::MetricsSettings;
use crate::health::HealthState;
use crate::types::PreferenceProfile;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use conduit_abstraction::TaskKind;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

/// Terminal record of one routed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Idempotency key.
    pub request_id: String,
    /// Model that served the request, or the last one attempted.
    pub model_id: String,
    /// Provider of `model_id`.
    pub provider: String,
    /// Task kind routed.
    pub task: TaskKind,
    /// Profile used.
    pub preference: PreferenceProfile,
    /// Whether a candidate succeeded.
    pub success: bool,
    /// Input tokens billed.
    pub input_tokens: u32,
    /// Output tokens billed.
    pub output_tokens: u32,
    /// Cost of the successful invocation.
    pub cost_usd: f64,
    /// End-to-end latency.
    pub latency_ms: f64,
    /// Time spent filtering and scoring.
    pub routing_ms: f64,
    /// Time spent in provider invocations.
    pub invocation_ms: f64,
    /// Invocation attempts made.
    pub attempts: usize,
    /// Whether a fallback candidate served the request.
    pub fallback_used: bool,
    /// Terminal error, for failed requests.
    pub error: Option<String>,
    /// When the request completed.
    pub timestamp: DateTime<Utc>,
}

/// Latency distribution over a set of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    /// Mean.
    pub avg_ms: f64,
    /// Median.
    pub p50_ms: f64,
    /// 95th percentile.
    pub p95_ms: f64,
    /// 99th percentile.
    pub p99_ms: f64,
    /// Fastest.
    pub min_ms: f64,
    /// Slowest.
    pub max_ms: f64,
}

impl LatencyPercentiles {
    #[allow(clippy::cast_precision_loss)]
    fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Self {
            avg_ms: samples.iter().sum::<f64>() / samples.len() as f64,
            p50_ms: percentile(&samples, 50.0),
            p95_ms: percentile(&samples, 95.0),
            p99_ms: percentile(&samples, 99.0),
            min_ms: samples[0],
            max_ms: samples[samples.len() - 1],
        }
    }
}

/// Nearest-rank percentile of pre-sorted values.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Aggregates for one group of outcomes (a model, provider, task or profile).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    /// Requests in the group.
    pub requests: usize,
    /// Successful requests.
    pub successes: usize,
    /// Failed / total.
    pub error_rate: f64,
    /// Latency distribution within the group.
    pub latency: LatencyPercentiles,
    /// Summed cost.
    pub total_cost_usd: f64,
}

/// Provider status derived from recent outcomes, for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    /// Provider name.
    pub provider: String,
    /// Healthy below 10% errors, degraded below 50%, unhealthy above.
    pub status: HealthState,
    /// Requests in the window.
    pub requests: usize,
    /// Failed / total.
    pub error_rate: f64,
    /// Mean latency.
    pub avg_latency_ms: f64,
}

/// Point-in-time view of the metrics window.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Outcomes inside the window.
    pub window_requests: usize,
    /// Successful outcomes.
    pub successes: usize,
    /// Failed outcomes.
    pub failures: usize,
    /// Failed / total.
    pub error_rate: f64,
    /// Latency distribution across all outcomes.
    pub latency: LatencyPercentiles,
    /// Summed cost.
    pub total_cost_usd: f64,
    /// Mean cost per request.
    pub avg_cost_usd: f64,
    /// Summed input + output tokens.
    pub total_tokens: u64,
    /// Share of requests served by a fallback candidate.
    pub fallback_rate: f64,
    /// Per model.
    pub by_model: BTreeMap<String, GroupStats>,
    /// Per provider.
    pub by_provider: BTreeMap<String, GroupStats>,
    /// Per task kind.
    pub by_task: BTreeMap<String, GroupStats>,
    /// Per preference profile.
    pub by_preference: BTreeMap<String, GroupStats>,
    /// Outcomes accepted since start, including evicted ones.
    pub lifetime_processed: u64,
    /// Seconds since the aggregator was created.
    pub uptime_secs: f64,
}

/// Fixed-size slice of an [`Outcome`] kept in the window.
///
/// Model and provider names are interned; the request id lives in a
/// parallel ring so records stay `Copy`.
#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    model: u32,
    provider: u32,
    task: TaskKind,
    preference: PreferenceProfile,
    success: bool,
    fallback_used: bool,
    input_tokens: u32,
    output_tokens: u32,
    cost_usd: f64,
    latency_ms: f64,
    timestamp: DateTime<Utc>,
}

/// Name table shared by model and provider ids.
#[derive(Debug, Default)]
struct Interner {
    names: Vec<Arc<str>>,
    lookup: HashMap<Arc<str>, u32>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.lookup.insert(name, id);
        id
    }
}

#[derive(Debug, Default)]
struct OutcomeWindow {
    records: VecDeque<WindowRecord>,
    request_ids: VecDeque<Arc<str>>,
    seen: HashSet<Arc<str>>,
    names: Interner,
}

impl OutcomeWindow {
    fn evict_front(&mut self) {
        self.records.pop_front();
        if let Some(evicted) = self.request_ids.pop_front() {
            self.seen.remove(&evicted);
        }
    }
}

/// Live records plus the names they refer to.
struct WindowView {
    records: Vec<WindowRecord>,
    request_ids: Vec<Arc<str>>,
    names: Vec<Arc<str>>,
}

impl WindowView {
    fn name(&self, id: u32) -> String {
        self.names.get(id as usize).map_or_else(String::new, ToString::to_string)
    }
}

/// Append-only, idempotent aggregator of request outcomes.
///
/// Memory is bounded by a ring of `capacity` outcomes, which are also
/// evicted once older than `max_age`. A request id already present in the
/// window is ignored.
#[derive(Debug)]
pub struct MetricsAggregator {
    settings: MetricsSettings,
    window: Mutex<OutcomeWindow>,
    processed: AtomicU64,
    started: Instant,
}

impl MetricsAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(settings: MetricsSettings) -> Self {
        Self {
            window: Mutex::new(OutcomeWindow {
                records: VecDeque::with_capacity(settings.capacity.min(4096)),
                request_ids: VecDeque::with_capacity(settings.capacity.min(4096)),
                ..OutcomeWindow::default()
            }),
            settings,
            processed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Oldest timestamp still inside the window; `None` when unbounded.
    fn cutoff(&self) -> Option<DateTime<Utc>> {
        let max_age = ChronoDuration::from_std(std::time::Duration::from_secs(self.settings.max_age_secs)).ok()?;
        Utc::now().checked_sub_signed(max_age)
    }

    /// Records an outcome. Returns `false` if its request id was already recorded.
    pub fn record(&self, outcome: Outcome) -> bool {
        let cutoff = self.cutoff();
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if window.seen.contains(outcome.request_id.as_str()) {
            debug!(request_id = %outcome.request_id, "Duplicate outcome ignored");
            return false;
        }

        while window.records.front().is_some_and(|r| cutoff.is_some_and(|c| r.timestamp < c)) {
            window.evict_front();
        }
        while window.records.len() >= self.settings.capacity.max(1) {
            window.evict_front();
        }

        let record = WindowRecord {
            model: window.names.intern(&outcome.model_id),
            provider: window.names.intern(&outcome.provider),
            task: outcome.task,
            preference: outcome.preference,
            success: outcome.success,
            fallback_used: outcome.fallback_used,
            input_tokens: outcome.input_tokens,
            output_tokens: outcome.output_tokens,
            cost_usd: outcome.cost_usd,
            latency_ms: outcome.latency_ms,
            timestamp: outcome.timestamp,
        };
        let request_id: Arc<str> = Arc::from(outcome.request_id);
        window.seen.insert(Arc::clone(&request_id));
        window.request_ids.push_back(request_id);
        window.records.push_back(record);
        self.processed.fetch_add(1, AtomicOrdering::Relaxed);
        true
    }

    /// Outcomes currently inside the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().records.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outcomes accepted since start.
    #[must_use]
    pub fn lifetime_processed(&self) -> u64 {
        self.processed.load(AtomicOrdering::Relaxed)
    }

    /// Copies the live records out under a short lock.
    fn live(&self) -> WindowView {
        let cutoff = self.cutoff();
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let mut view = WindowView {
            records: Vec::with_capacity(window.records.len()),
            request_ids: Vec::with_capacity(window.records.len()),
            names: window.names.names.clone(),
        };
        for (record, request_id) in window.records.iter().zip(window.request_ids.iter()) {
            if cutoff.is_none_or(|c| record.timestamp >= c) {
                view.records.push(*record);
                view.request_ids.push(Arc::clone(request_id));
            }
        }
        view
    }

    /// Request ids of the most recent outcomes, newest first.
    #[must_use]
    pub fn recent_request_ids(&self, limit: usize) -> Vec<String> {
        self.live().request_ids.iter().rev().take(limit).map(ToString::to_string).collect()
    }

    /// Aggregates over the live window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let view = self.live();
        let records = &view.records;
        let total = records.len();
        let successes = records.iter().filter(|r| r.success).count();
        let total_cost_usd: f64 = records.iter().map(|r| r.cost_usd).sum();
        let fallbacks = records.iter().filter(|r| r.fallback_used).count();

        MetricsSnapshot {
            window_requests: total,
            successes,
            failures: total - successes,
            error_rate: ratio(total - successes, total),
            latency: LatencyPercentiles::from_samples(records.iter().map(|r| r.latency_ms).collect()),
            total_cost_usd,
            avg_cost_usd: if total == 0 { 0.0 } else { total_cost_usd / total as f64 },
            total_tokens: records
                .iter()
                .map(|r| u64::from(r.input_tokens) + u64::from(r.output_tokens))
                .sum(),
            fallback_rate: ratio(fallbacks, total),
            by_model: group_by(records, |r| view.name(r.model)),
            by_provider: group_by(records, |r| view.name(r.provider)),
            by_task: group_by(records, |r| r.task.to_string()),
            by_preference: group_by(records, |r| r.preference.to_string()),
            lifetime_processed: self.lifetime_processed(),
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    /// Per-provider status derived from the window, sorted by name.
    #[must_use]
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        let view = self.live();
        group_by(&view.records, |r| view.name(r.provider))
            .into_iter()
            .map(|(provider, stats)| ProviderStatus {
                provider,
                status: if stats.error_rate < 0.1 {
                    HealthState::Healthy
                } else if stats.error_rate < 0.5 {
                    HealthState::Degraded
                } else {
                    HealthState::Unhealthy
                },
                requests: stats.requests,
                error_rate: stats.error_rate,
                avg_latency_ms: stats.latency.avg_ms,
            })
            .collect()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsSettings::default())
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

fn group_by<F>(records: &[WindowRecord], key: F) -> BTreeMap<String, GroupStats>
where
    F: Fn(&WindowRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<&WindowRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(name, members)| {
            let successes = members.iter().filter(|r| r.success).count();
            let stats = GroupStats {
                requests: members.len(),
                successes,
                error_rate: ratio(members.len() - successes, members.len()),
                latency: LatencyPercentiles::from_samples(members.iter().map(|r| r.latency_ms).collect()),
                total_cost_usd: members.iter().map(|r| r.cost_usd).sum(),
            };
            (name, stats)
        })
        .collect()
}
