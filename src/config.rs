//! Typed configuration, loaded once at start-up from environment variables
//! (design note §9: replaces the Python original's scattered `getenv` calls).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub redis_url: Option<String>,
    pub kafka_bootstrap: Option<String>,
    pub opa_url: Option<String>,
    pub audit_url: Option<String>,

    pub drift_psi_threshold: f32,
    pub drift_share_threshold: f32,
    pub min_samples_for_drift: usize,
    pub min_samples_for_prediction: usize,
    pub enable_cold_start_fallback: bool,

    /// Whether `StaticHashValidator` enforces the hash check (§4.1 "non-strict
    /// mode skips the hash check but content/id checks stand").
    pub strict_hash_mode: bool,

    pub opa_timeout: Duration,
    pub policy_timeout: Duration,
    pub redis_timeout: Duration,
    pub kafka_produce_timeout: Duration,
    pub audit_timeout: Duration,
    pub guardrail_pipeline_timeout: Duration,

    pub deliberation_threshold: f32,
    pub opa_fail_closed: bool,
    pub policy_fail_closed: bool,
    pub guardrails_fail_closed: bool,

    /// §9 open-question resolution: dynamic-policy mode requires a token to
    /// register (matches `agent_bus.py`, overrides the looser `core.py`
    /// variant which allowed tokenless registration).
    pub dynamic_policy_requires_token: bool,
    /// Whether the Kafka bridge is active for outbound `send`. Derived from
    /// `kafka_bootstrap` being configured unless explicitly overridden.
    pub kafka_enabled: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            kafka_bootstrap: None,
            opa_url: None,
            audit_url: None,
            drift_psi_threshold: 0.2,
            drift_share_threshold: 0.1,
            min_samples_for_drift: 30,
            min_samples_for_prediction: 50,
            enable_cold_start_fallback: true,
            strict_hash_mode: true,
            opa_timeout: Duration::from_secs(5),
            policy_timeout: Duration::from_secs(5),
            redis_timeout: Duration::from_secs(5),
            kafka_produce_timeout: Duration::from_secs(10),
            audit_timeout: Duration::from_secs(5),
            guardrail_pipeline_timeout: Duration::from_secs(15),
            deliberation_threshold: 0.8,
            opa_fail_closed: true,
            policy_fail_closed: true,
            guardrails_fail_closed: true,
            dynamic_policy_requires_token: false,
            kafka_enabled: false,
        }
    }
}

impl BusConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").ok(),
            kafka_bootstrap: std::env::var("KAFKA_BOOTSTRAP").ok(),
            opa_url: std::env::var("OPA_URL").ok(),
            audit_url: std::env::var("AUDIT_URL").ok(),
            drift_psi_threshold: env_f32("DRIFT_PSI_THRESHOLD", defaults.drift_psi_threshold),
            drift_share_threshold: env_f32("DRIFT_SHARE_THRESHOLD", defaults.drift_share_threshold),
            min_samples_for_drift: env_usize("MIN_SAMPLES_FOR_DRIFT", defaults.min_samples_for_drift),
            min_samples_for_prediction: env_usize(
                "MIN_SAMPLES_FOR_PREDICTION",
                defaults.min_samples_for_prediction,
            ),
            enable_cold_start_fallback: env_bool(
                "ENABLE_COLD_START_FALLBACK",
                defaults.enable_cold_start_fallback,
            ),
            strict_hash_mode: env_bool("BUS_STRICT_HASH_MODE", defaults.strict_hash_mode),
            kafka_enabled: env_bool(
                "KAFKA_BOOTSTRAP_ENABLED",
                std::env::var("KAFKA_BOOTSTRAP").is_ok(),
            ),
            ..defaults
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = BusConfig::default();
        assert_eq!(c.deliberation_threshold, 0.8);
        assert!(c.opa_fail_closed);
        assert_eq!(c.guardrail_pipeline_timeout, Duration::from_secs(15));
    }
}
