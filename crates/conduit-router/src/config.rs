//! TOML configuration for the routing engine.

use crate::registry::{CandidateRegistry, validate_candidate};
use crate::types::{ModelCandidate, PreferenceProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Attempt and timeout policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Maximum invocation attempts per request.
    pub max_attempts: usize,
    /// Per-attempt timeout as a multiple of the candidate's baseline latency.
    pub timeout_multiplier: f64,
    /// Lower bound of the per-attempt timeout.
    pub min_attempt_timeout_ms: u64,
    /// Upper bound of the per-attempt timeout.
    pub max_attempt_timeout_ms: u64,
    /// Profile used when a request does not name one.
    pub default_preference: String,
    /// Expected output tokens per input token, for pre-invocation cost estimates.
    pub expected_output_ratio: f64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_multiplier: 3.0,
            min_attempt_timeout_ms: 250,
            max_attempt_timeout_ms: 30_000,
            default_preference: "balanced".to_string(),
            expected_output_ratio: 0.3,
        }
    }
}

impl RoutingSettings {
    /// Timeout for one attempt on a candidate with the given baseline latency.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn attempt_timeout(&self, baseline_latency_ms: u64) -> Duration {
        let scaled = (baseline_latency_ms as f64 * self.timeout_multiplier).ceil();
        let scaled = if scaled.is_finite() && scaled > 0.0 { scaled as u64 } else { 0 };
        let min = self.min_attempt_timeout_ms.min(self.max_attempt_timeout_ms);
        Duration::from_millis(scaled.clamp(min, self.max_attempt_timeout_ms))
    }

    /// Upper bound on time spent invoking providers for one request.
    ///
    /// Attempts are sequential, each bounded by `max_attempt_timeout_ms`.
    #[must_use]
    pub fn worst_case_invocation_time(&self) -> Duration {
        Duration::from_millis(self.max_attempt_timeout_ms)
            .saturating_mul(u32::try_from(self.max_attempts).unwrap_or(u32::MAX))
    }

    /// Parsed default preference; balanced if the name is unknown.
    #[must_use]
    pub fn preference(&self) -> PreferenceProfile {
        self.default_preference.parse().unwrap_or_default()
    }
}

/// Health state thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Outcomes kept per provider.
    pub window_size: usize,
    /// Maximum age of a kept outcome.
    pub window_secs: u64,
    /// Error rate above which a provider is degraded.
    pub degraded_error_rate: f64,
    /// Error rate above which a provider is unhealthy.
    pub unhealthy_error_rate: f64,
    /// Failures in a row that mark a provider unhealthy.
    pub consecutive_failures: u32,
    /// Time between recovery steps.
    pub cooldown_secs: u64,
    /// Outcomes needed before the error rate can escalate state.
    pub min_samples: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            window_size: 50,
            window_secs: 300,
            degraded_error_rate: 0.10,
            unhealthy_error_rate: 0.40,
            consecutive_failures: 3,
            cooldown_secs: 30,
            min_samples: 5,
        }
    }
}

impl HealthSettings {
    /// Window age limit.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Cooldown between recovery steps.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Metrics window bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Outcomes kept in the ring.
    pub capacity: usize,
    /// Maximum age of a kept outcome.
    pub max_age_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { capacity: 10_000, max_age_secs: 86_400 }
    }
}

/// Scoring knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Final scores closer than this are tied.
    pub tie_epsilon: f64,
    /// Score given on an axis where every candidate has the same value.
    pub uniform_axis_score: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self { tie_epsilon: 1e-9, uniform_axis_score: 1.0 }
    }
}

/// Full router configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Attempt and timeout policy.
    pub routing: RoutingSettings,
    /// Health thresholds.
    pub health: HealthSettings,
    /// Metrics window.
    pub metrics: MetricsSettings,
    /// Scoring knobs.
    pub scoring: ScoringSettings,
    /// Model catalog; the built-in catalog is used when empty.
    pub models: Vec<ModelCandidate>,
}

impl RouterConfig {
    /// Registry for the configured catalog.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` on duplicate ids or an invalid model.
    pub fn registry(&self) -> Result<CandidateRegistry> {
        if self.models.is_empty() {
            Ok(CandidateRegistry::builtin())
        } else {
            CandidateRegistry::new(self.models.clone())
        }
    }
}

/// Configuration loader for router settings.
pub struct RouterConfigLoader;

impl RouterConfigLoader {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<RouterConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<RouterConfig> {
        let config: RouterConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(config: &RouterConfig) -> Result<()> {
        let routing = &config.routing;
        if routing.max_attempts == 0 {
            return Err(ConfigError::Validation("routing.max_attempts must be at least 1".to_string()));
        }
        if !(routing.timeout_multiplier.is_finite() && routing.timeout_multiplier > 0.0) {
            return Err(ConfigError::Validation(format!(
                "routing.timeout_multiplier must be positive, got {}",
                routing.timeout_multiplier
            )));
        }
        if routing.min_attempt_timeout_ms > routing.max_attempt_timeout_ms {
            return Err(ConfigError::Validation(format!(
                "routing.min_attempt_timeout_ms ({}) must be <= max_attempt_timeout_ms ({})",
                routing.min_attempt_timeout_ms, routing.max_attempt_timeout_ms
            )));
        }
        if routing.default_preference.parse::<PreferenceProfile>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid default preference: {}. Valid options: fast, cheap, best, balanced",
                routing.default_preference
            )));
        }
        if !(routing.expected_output_ratio.is_finite() && routing.expected_output_ratio >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "routing.expected_output_ratio must be non-negative, got {}",
                routing.expected_output_ratio
            )));
        }

        let health = &config.health;
        for (name, rate) in [
            ("degraded_error_rate", health.degraded_error_rate),
            ("unhealthy_error_rate", health.unhealthy_error_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Validation(format!("health.{name} must be within [0, 1], got {rate}")));
            }
        }
        if health.degraded_error_rate > health.unhealthy_error_rate {
            return Err(ConfigError::Validation(format!(
                "health.degraded_error_rate ({}) must be <= unhealthy_error_rate ({})",
                health.degraded_error_rate, health.unhealthy_error_rate
            )));
        }
        if health.window_size == 0 || health.window_secs == 0 {
            return Err(ConfigError::Validation("health window must be non-empty".to_string()));
        }
        if health.consecutive_failures == 0 {
            return Err(ConfigError::Validation("health.consecutive_failures must be at least 1".to_string()));
        }

        if config.metrics.capacity == 0 {
            return Err(ConfigError::Validation("metrics.capacity must be at least 1".to_string()));
        }

        let scoring = &config.scoring;
        if !(scoring.tie_epsilon.is_finite() && scoring.tie_epsilon >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "scoring.tie_epsilon must be non-negative, got {}",
                scoring.tie_epsilon
            )));
        }
        if !(0.0..=1.0).contains(&scoring.uniform_axis_score) {
            return Err(ConfigError::Validation(format!(
                "scoring.uniform_axis_score must be within [0, 1], got {}",
                scoring.uniform_axis_score
            )));
        }

        let mut ids = HashSet::new();
        for model in &config.models {
            validate_candidate(model)?;
            if !ids.insert(model.id.as_str()) {
                return Err(ConfigError::Validation(format!("Duplicate model id: {}", model.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_abstraction::TaskKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RouterConfigLoader::from_toml_str("").unwrap();
        assert_eq!(config.routing, RoutingSettings::default());
        assert_eq!(config.health.window_size, 50);
        assert_eq!(config.metrics.capacity, 10_000);
        assert_eq!(config.registry().unwrap().len(), CandidateRegistry::builtin().len());
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[routing]
max_attempts = 2
default_preference = "cheap"

[health]
cooldown_secs = 5

[[models]]
id = "small"
provider = "local"
tasks = ["chat", "summarize"]
max_input_tokens = 2048
max_output_tokens = 512
input_price_per_1k = 0.0
output_price_per_1k = 0.0
latency_ms = 40
quality = 0.6
"#
        )
        .unwrap();

        let config = RouterConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.routing.max_attempts, 2);
        assert_eq!(config.routing.preference(), PreferenceProfile::Cheap);
        assert_eq!(config.routing.timeout_multiplier, 3.0);
        assert_eq!(config.health.cooldown(), Duration::from_secs(5));

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 1);
        let model = registry.get("small").unwrap();
        assert!(model.supports(TaskKind::Summarize));
        assert_eq!(model.baseline_latency_ms, 40);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            "[routing]\nmax_attempts = 0",
            "[routing]\ntimeout_multiplier = 0.0",
            "[routing]\nmin_attempt_timeout_ms = 500\nmax_attempt_timeout_ms = 100",
            "[routing]\ndefault_preference = \"fastest\"",
            "[health]\ndegraded_error_rate = 0.5\nunhealthy_error_rate = 0.2",
            "[health]\nunhealthy_error_rate = 1.5",
            "[health]\nwindow_size = 0",
            "[metrics]\ncapacity = 0",
            "[scoring]\nuniform_axis_score = 2.0",
        ];
        for case in cases {
            let result = RouterConfigLoader::from_toml_str(case);
            assert!(matches!(result, Err(ConfigError::Validation(_))), "accepted: {case}");
        }
    }

    #[test]
    fn test_validate_rejects_bad_models() {
        let model = r#"
[[models]]
id = "m"
provider = "p"
tasks = ["chat"]
max_input_tokens = 10
max_output_tokens = 10
input_price_per_1k = 0.1
output_price_per_1k = 0.1
latency_ms = 10
quality = 0.5
"#;
        assert!(RouterConfigLoader::from_toml_str(model).is_ok());
        let duplicate = format!("{model}{model}");
        assert!(matches!(RouterConfigLoader::from_toml_str(&duplicate), Err(ConfigError::Validation(_))));
        let negative = model.replace("input_price_per_1k = 0.1", "input_price_per_1k = -0.1");
        assert!(RouterConfigLoader::from_toml_str(&negative).is_err());
        let no_tasks = model.replace("tasks = [\"chat\"]", "tasks = []");
        assert!(RouterConfigLoader::from_toml_str(&no_tasks).is_err());
        let bad_quality = model.replace("quality = 0.5", "quality = 1.5");
        assert!(RouterConfigLoader::from_toml_str(&bad_quality).is_err());
    }

    #[test]
    fn test_unknown_task_is_parse_error() {
        let content = r#"
[[models]]
id = "m"
provider = "p"
tasks = ["poetry"]
max_input_tokens = 10
max_output_tokens = 10
input_price_per_1k = 0.1
output_price_per_1k = 0.1
latency_ms = 10
quality = 0.5
"#;
        assert!(matches!(RouterConfigLoader::from_toml_str(content), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = RouterConfigLoader::load(Path::new("/nonexistent/conduit.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_attempt_timeout_is_clamped() {
        let settings = RoutingSettings::default();
        assert_eq!(settings.attempt_timeout(10), Duration::from_millis(250));
        assert_eq!(settings.attempt_timeout(1000), Duration::from_millis(3000));
        assert_eq!(settings.attempt_timeout(60_000), Duration::from_millis(30_000));
        assert_eq!(settings.worst_case_invocation_time(), Duration::from_secs(90));
    }
}
