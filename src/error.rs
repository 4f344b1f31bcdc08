//! Domain error taxonomy for the bus.
//!
//! Mirrors the shape of the Python original's `AgentBusError.to_dict()`:
//! every variant carries a stable `kind()` tag, a message and a details map,
//! so it serialises uniformly for logs and audit entries.

use std::collections::HashMap;

use crate::types::CONSTITUTIONAL_HASH;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("constitutional hash mismatch: {masked_got} (expected {masked_expected})")]
    ConstitutionalMismatch {
        masked_got: String,
        masked_expected: String,
    },

    #[error("prompt injection detected: {pattern}")]
    PromptInjection { pattern: String },

    #[error("tenant mismatch: message tenant_id '{msg_tenant}' does not match recipient tenant_id '{recipient_tenant}'")]
    TenantMismatch {
        msg_tenant: String,
        recipient_tenant: String,
    },

    #[error("handler '{handler}' failed: {reason}")]
    HandlerFailed { handler: String, reason: String },

    #[error("policy registry unreachable: {0}")]
    PolicyRegistryUnreachable(String),

    #[error("OPA service unavailable: {0}")]
    OpaUnavailable(String),

    #[error("kafka produce failed: {0}")]
    KafkaProduceFailed(String),

    #[error("registry backend unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("agent '{0}' already registered")]
    AgentAlreadyRegistered(String),

    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("guardrail layer '{layer}' timed out after {timeout_ms}ms")]
    GuardrailTimeout { layer: String, timeout_ms: u64 },

    #[error("identity token invalid: {0}")]
    InvalidToken(String),

    #[error("bus is not running (state={0})")]
    NotStarted(String),

    #[error("all processing strategies failed")]
    AllStrategiesFailed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl BusError {
    /// Stable machine-readable tag, analogous to Python's `error_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            BusError::ConstitutionalMismatch { .. } => "constitutional_mismatch",
            BusError::PromptInjection { .. } => "prompt_injection",
            BusError::TenantMismatch { .. } => "tenant_mismatch",
            BusError::HandlerFailed { .. } => "handler_failed",
            BusError::PolicyRegistryUnreachable(_) => "policy_registry_unreachable",
            BusError::OpaUnavailable(_) => "opa_unavailable",
            BusError::KafkaProduceFailed(_) => "kafka_produce_failed",
            BusError::RegistryUnavailable(_) => "registry_unavailable",
            BusError::AgentAlreadyRegistered(_) => "agent_already_registered",
            BusError::AgentNotFound(_) => "agent_not_found",
            BusError::GuardrailTimeout { .. } => "guardrail_timeout",
            BusError::InvalidToken(_) => "invalid_token",
            BusError::NotStarted(_) => "not_started",
            BusError::AllStrategiesFailed => "all_strategies_failed",
            BusError::Internal(_) => "internal",
        }
    }

    /// Whether this error is a deterministic denial that must short-circuit
    /// the composite processing strategy (spec §4.4 / §9), as opposed to a
    /// transient/availability failure that should fall through to the next
    /// strategy in the chain.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            BusError::ConstitutionalMismatch { .. }
                | BusError::PromptInjection { .. }
                | BusError::TenantMismatch { .. }
                | BusError::HandlerFailed { .. }
                | BusError::AgentAlreadyRegistered(_)
                | BusError::AgentNotFound(_)
                | BusError::InvalidToken(_)
        )
    }

    pub fn to_details(&self) -> HashMap<String, String> {
        let mut d = HashMap::new();
        d.insert("error_type".to_string(), self.kind().to_string());
        d.insert("message".to_string(), self.to_string());
        d.insert(
            "constitutional_hash".to_string(),
            CONSTITUTIONAL_HASH.to_string(),
        );
        d
    }
}

pub type BusResult<T> = Result<T, BusError>;

/// Masks a hash for disclosure-safe error messages: first 8 chars + "…".
pub fn mask_hash(hash: &str) -> String {
    if hash.len() <= 8 {
        format!("{hash}…")
    } else {
        format!("{}…", &hash[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hash_truncates() {
        assert_eq!(mask_hash("cdd01ef066bc6cf2"), "cdd01ef0…");
        assert_eq!(mask_hash("0000"), "0000…");
    }

    #[test]
    fn tenant_mismatch_message_matches_scenario_s2() {
        let err = BusError::TenantMismatch {
            msg_tenant: "t1".to_string(),
            recipient_tenant: "t2".to_string(),
        };
        assert!(err.to_string().contains("recipient tenant_id 't2'"));
    }

    #[test]
    fn deterministic_classification() {
        assert!(BusError::PromptInjection {
            pattern: "x".into()
        }
        .is_deterministic());
        assert!(!BusError::OpaUnavailable("timeout".into()).is_deterministic());
    }
}
