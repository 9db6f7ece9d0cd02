//! Provider health tracking over rolling outcome windows.
//!
//! Each provider owns a fixed-capacity window of recent outcomes behind its
//! own lock. State is derived from the window:
//!
//! - Healthy -> Degraded when the error rate exceeds `degraded_error_rate`.
//! - -> Unhealthy when the error rate exceeds `unhealthy_error_rate` or
//!   `consecutive_failures` failures arrive in a row.
//! - Recovery moves one step at a time, once per `cooldown`, while the
//!   window supports the better state.
//!
//! Recovery is evaluated lazily on the next read or write, so there is no
//! background timer.

use crate::config::HealthSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Derived reliability classification of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Serving normally.
    Healthy,
    /// Elevated error rate.
    Degraded,
    /// Failing; scored with zero availability.
    Unhealthy,
}

impl HealthState {
    /// The next better state, if any.
    fn improved(self) -> Self {
        match self {
            HealthState::Unhealthy => HealthState::Degraded,
            HealthState::Degraded | HealthState::Healthy => HealthState::Healthy,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    success: bool,
    latency_ms: f64,
}

/// Statistics over the live part of a window.
#[derive(Debug, Clone, Copy, Default)]
struct WindowStats {
    samples: usize,
    failures: usize,
    trailing_failures: usize,
    latency_sum_ms: f64,
}

impl WindowStats {
    #[allow(clippy::cast_precision_loss)]
    fn error_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.failures as f64 / self.samples as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg_latency_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.latency_sum_ms / self.samples as f64
        }
    }
}

/// Rolling window and last committed state for one provider.
#[derive(Debug)]
struct ProviderWindow {
    samples: VecDeque<Sample>,
    state: HealthState,
    last_transition: Instant,
    total_requests: u64,
    total_failures: u64,
}

impl ProviderWindow {
    fn new(capacity: usize, now: Instant) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            state: HealthState::Healthy,
            last_transition: now,
            total_requests: 0,
            total_failures: 0,
        }
    }

    fn push(&mut self, sample: Sample, capacity: usize) {
        if self.samples.len() == capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_requests += 1;
        if !sample.success {
            self.total_failures += 1;
        }
    }

    fn evict_expired(&mut self, now: Instant, max_age: Duration) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > max_age {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn stats(&self, now: Instant, max_age: Duration) -> WindowStats {
        let mut stats = WindowStats::default();
        for sample in self.samples.iter().filter(|s| now.saturating_duration_since(s.at) <= max_age) {
            stats.samples += 1;
            stats.latency_sum_ms += sample.latency_ms;
            if sample.success {
                stats.trailing_failures = 0;
            } else {
                stats.failures += 1;
                stats.trailing_failures += 1;
            }
        }
        stats
    }

    /// Effective state and transition time at `now`. Does not mutate.
    fn evaluate(&self, settings: &HealthSettings, now: Instant) -> (HealthState, Instant, WindowStats) {
        let stats = self.stats(now, settings.window());
        let escalate_to = target_state(settings, &stats, settings.min_samples);

        if escalate_to > self.state {
            return (escalate_to, now, stats);
        }

        // Recovery is judged on whatever the window holds, however small.
        let recover_to = target_state(settings, &stats, 0);
        let cooldown = settings.cooldown();
        let mut state = self.state;
        let mut last = self.last_transition;
        while recover_to < state && now.saturating_duration_since(last) >= cooldown {
            state = state.improved();
            last += cooldown;
        }
        (state, last, stats)
    }
}

fn target_state(settings: &HealthSettings, stats: &WindowStats, min_samples: usize) -> HealthState {
    let enough = stats.samples >= min_samples;
    let rate = stats.error_rate();
    if stats.trailing_failures >= settings.consecutive_failures as usize
        || (enough && rate > settings.unhealthy_error_rate)
    {
        HealthState::Unhealthy
    } else if enough && rate > settings.degraded_error_rate {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Point-in-time health view of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    /// Provider name.
    pub provider: String,
    /// Effective state.
    pub state: HealthState,
    /// Error rate over the live window.
    pub error_rate: f64,
    /// Availability score used by the scorer.
    pub availability_score: f64,
    /// Outcomes in the live window.
    pub window_samples: usize,
    /// Failures in the live window.
    pub window_failures: usize,
    /// Failures at the tail of the window.
    pub consecutive_failures: usize,
    /// Mean latency over the live window.
    pub avg_latency_ms: f64,
    /// Lifetime recorded outcomes.
    pub total_requests: u64,
    /// Lifetime recorded failures.
    pub total_failures: u64,
    /// Seconds since the last state transition.
    pub secs_since_transition: f64,
}

/// Availability scores captured once per request so ranking sees one
/// consistent view. Providers missing from the snapshot count as healthy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailabilitySnapshot {
    scores: HashMap<String, f64>,
}

impl AvailabilitySnapshot {
    /// Snapshot from explicit scores.
    #[must_use]
    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self { scores: scores.into_iter().map(|(p, s)| (p.into(), s.clamp(0.0, 1.0))).collect() }
    }

    /// Availability of `provider`.
    #[must_use]
    pub fn get(&self, provider: &str) -> f64 {
        self.scores.get(provider).copied().unwrap_or(1.0)
    }
}

/// Tracks provider health across concurrent requests.
///
/// Synchronisation is per provider: the outer map lock is only taken for
/// writing the first time a provider is seen, so updates for one provider
/// never block reads or updates for another.
#[derive(Debug)]
pub struct HealthTracker {
    settings: HealthSettings,
    providers: RwLock<HashMap<String, Arc<RwLock<ProviderWindow>>>>,
}

impl HealthTracker {
    /// Creates a tracker with the given thresholds.
    #[must_use]
    pub fn new(settings: HealthSettings) -> Self {
        Self { settings, providers: RwLock::new(HashMap::new()) }
    }

    /// Thresholds in use.
    #[must_use]
    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    fn window(&self, provider: &str) -> Option<Arc<RwLock<ProviderWindow>>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.get(provider).cloned()
    }

    fn window_or_insert(&self, provider: &str, now: Instant) -> Arc<RwLock<ProviderWindow>> {
        if let Some(window) = self.window(provider) {
            return window;
        }
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            providers
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(ProviderWindow::new(self.settings.window_size, now)))),
        )
    }

    /// Records one outcome for `provider` at the current time.
    pub fn record(&self, provider: &str, success: bool, latency_ms: f64) {
        self.record_at(provider, success, latency_ms, Instant::now());
    }

    /// Records one outcome observed at `at`.
    ///
    /// Appends to the window, evicts expired samples and commits the
    /// recomputed state. Samples older than the newest one are stamped
    /// with the newest time so the window stays ordered.
    pub fn record_at(&self, provider: &str, success: bool, latency_ms: f64, at: Instant) {
        let window = self.window_or_insert(provider, at);
        let mut window = window.write().unwrap_or_else(PoisonError::into_inner);

        let at = window.samples.back().map_or(at, |last| at.max(last.at));
        window.push(Sample { at, success, latency_ms: latency_ms.max(0.0) }, self.settings.window_size);
        window.evict_expired(at, self.settings.window());

        let previous = window.state;
        let (state, last_transition, stats) = window.evaluate(&self.settings, at);
        window.state = state;
        window.last_transition = last_transition;

        if state > previous {
            warn!(
                provider = %provider,
                from = %previous,
                to = %state,
                error_rate = stats.error_rate(),
                consecutive_failures = stats.trailing_failures,
                "Provider health worsened"
            );
        } else if state < previous {
            info!(provider = %provider, from = %previous, to = %state, "Provider health recovered");
        }
    }

    /// Effective state of `provider` now. Unknown providers are healthy.
    #[must_use]
    pub fn state(&self, provider: &str) -> HealthState {
        self.state_at(provider, Instant::now())
    }

    /// Effective state of `provider` at `now`.
    #[must_use]
    pub fn state_at(&self, provider: &str, now: Instant) -> HealthState {
        self.window(provider).map_or(HealthState::Healthy, |window| {
            let window = window.read().unwrap_or_else(PoisonError::into_inner);
            window.evaluate(&self.settings, now).0
        })
    }

    /// Error rate of `provider` over its live window.
    #[must_use]
    pub fn error_rate(&self, provider: &str) -> f64 {
        self.window(provider).map_or(0.0, |window| {
            let window = window.read().unwrap_or_else(PoisonError::into_inner);
            window.stats(Instant::now(), self.settings.window()).error_rate()
        })
    }

    /// Availability score in [0, 1] for scoring.
    ///
    /// Healthy = 1.0, Degraded = 0.5 x (1 - error rate), Unhealthy = 0.0.
    #[must_use]
    pub fn availability_score(&self, provider: &str) -> f64 {
        self.availability_score_at(provider, Instant::now())
    }

    /// Availability score at `now`.
    #[must_use]
    pub fn availability_score_at(&self, provider: &str, now: Instant) -> f64 {
        self.window(provider).map_or(1.0, |window| {
            let window = window.read().unwrap_or_else(PoisonError::into_inner);
            let (state, _, stats) = window.evaluate(&self.settings, now);
            availability(state, stats.error_rate())
        })
    }

    /// Availability of each provider at a single instant.
    #[must_use]
    pub fn availability_snapshot<'a, I>(&self, providers: I) -> AvailabilitySnapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Instant::now();
        let scores = providers
            .into_iter()
            .map(|provider| (provider.to_string(), self.availability_score_at(provider, now)))
            .collect();
        AvailabilitySnapshot { scores }
    }

    /// Health view of one provider, if it has recorded outcomes.
    #[must_use]
    pub fn provider_snapshot(&self, provider: &str) -> Option<ProviderHealth> {
        let now = Instant::now();
        self.window(provider).map(|window| {
            let window = window.read().unwrap_or_else(PoisonError::into_inner);
            self.describe(provider, &window, now)
        })
    }

    /// Health view of every known provider, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let now = Instant::now();
        let windows: Vec<(String, Arc<RwLock<ProviderWindow>>)> = {
            let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
            providers.iter().map(|(name, w)| (name.clone(), Arc::clone(w))).collect()
        };
        let mut views: Vec<ProviderHealth> = windows
            .iter()
            .map(|(name, window)| {
                let window = window.read().unwrap_or_else(PoisonError::into_inner);
                self.describe(name, &window, now)
            })
            .collect();
        views.sort_by(|a, b| a.provider.cmp(&b.provider));
        views
    }

    fn describe(&self, provider: &str, window: &ProviderWindow, now: Instant) -> ProviderHealth {
        let (state, last_transition, stats) = window.evaluate(&self.settings, now);
        ProviderHealth {
            provider: provider.to_string(),
            state,
            error_rate: stats.error_rate(),
            availability_score: availability(state, stats.error_rate()),
            window_samples: stats.samples,
            window_failures: stats.failures,
            consecutive_failures: stats.trailing_failures,
            avg_latency_ms: stats.avg_latency_ms(),
            total_requests: window.total_requests,
            total_failures: window.total_failures,
            secs_since_transition: now.saturating_duration_since(last_transition).as_secs_f64(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthSettings::default())
    }
}

fn availability(state: HealthState, error_rate: f64) -> f64 {
    match state {
        HealthState::Healthy => 1.0,
        HealthState::Degraded => (0.5 * (1.0 - error_rate)).clamp(0.0, 1.0),
        HealthState::Unhealthy => 0.0,
    }
}
