//! Argument types and parsers shared between commands.

use conduit_router::{PreferenceProfile, TaskKind};

/// Injected failure rate for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureInjection {
    pub provider: String,
    pub rate: f64,
}

pub fn parse_task(value: &str) -> Result<TaskKind, String> {
    value.parse()
}

pub fn parse_preference(value: &str) -> Result<PreferenceProfile, String> {
    value.parse().map_err(|e: conduit_router::RoutingError| e.to_string())
}

/// Parses `provider=rate` with a rate in [0, 1].
pub fn parse_failure(value: &str) -> Result<FailureInjection, String> {
    let (provider, rate) =
        value.split_once('=').ok_or_else(|| format!("expected provider=rate, got '{value}'"))?;
    let provider = provider.trim();
    if provider.is_empty() {
        return Err(format!("missing provider name in '{value}'"));
    }
    let rate: f64 = rate.trim().parse().map_err(|_| format!("invalid failure rate '{rate}'"))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("failure rate must be within [0, 1], got {rate}"));
    }
    Ok(FailureInjection { provider: provider.to_string(), rate })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure() {
        let parsed = parse_failure("openai=0.25").unwrap();
        assert_eq!(parsed, FailureInjection { provider: "openai".to_string(), rate: 0.25 });

        assert!(parse_failure("openai").is_err());
        assert!(parse_failure("=0.5").is_err());
        assert!(parse_failure("openai=lots").is_err());
        assert!(parse_failure("openai=1.5").is_err());
    }

    #[test]
    fn test_parse_profiles_and_tasks() {
        assert_eq!(parse_preference("cheap").unwrap(), PreferenceProfile::Cheap);
        assert!(parse_preference("luxurious").is_err());
        assert_eq!(parse_task("code").unwrap(), TaskKind::Code);
        assert!(parse_task("juggling").is_err());
    }
}
