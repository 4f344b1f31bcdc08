//! Validator contract (§4.1): `validate(msg) -> ValidationResult`.
//!
//! Variants: StaticHash, DynamicPolicy (delegates to a policy registry RPC),
//! OPA (delegates to policy-engine evaluation). Grounded on the teacher's
//! `validate_constitutional_hash`/`validate_message_structure` plus
//! `original_source/registry.py`'s `StaticHashValidationStrategy` /
//! `DynamicPolicyValidationStrategy`.

use async_trait::async_trait;

use crate::error::mask_hash;
use crate::opa::OpaClient;
use crate::policy::PolicyClient;
use crate::types::{AgentMessage, ValidationResult, CONSTITUTIONAL_HASH};

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, message: &AgentMessage) -> ValidationResult;
    fn name(&self) -> &str;
}

/// Validates the message's constitutional hash plus minimal structural
/// invariants (non-empty id, non-empty content). Terminal fallback — always
/// available, never fails transiently.
pub struct StaticHashValidator {
    pub expected_hash: String,
    pub strict: bool,
}

impl StaticHashValidator {
    pub fn new(strict: bool) -> Self {
        Self {
            expected_hash: CONSTITUTIONAL_HASH.to_string(),
            strict,
        }
    }
}

#[async_trait]
impl Validator for StaticHashValidator {
    async fn validate(&self, message: &AgentMessage) -> ValidationResult {
        let mut result = ValidationResult::new();

        if message.message_id.is_empty() {
            result.add_error("message_id is empty");
        }
        if message.content.is_empty() {
            result.add_error("content must not be empty");
        }

        if self.strict && message.constitutional_hash != self.expected_hash {
            result.add_error(format!(
                "Constitutional hash mismatch: expected {}, got {}",
                mask_hash(&self.expected_hash),
                mask_hash(&message.constitutional_hash)
            ));
        }

        result
    }

    fn name(&self) -> &str {
        "static_hash"
    }
}

/// Delegates to a policy-registry RPC that verifies a rotating signature.
/// On RPC failure, behaviour is governed by `fail_closed`.
pub struct DynamicPolicyValidator {
    pub client: PolicyClient,
    pub fail_closed: bool,
}

impl DynamicPolicyValidator {
    pub fn new(client: PolicyClient, fail_closed: bool) -> Self {
        Self { client, fail_closed }
    }
}

#[async_trait]
impl Validator for DynamicPolicyValidator {
    async fn validate(&self, message: &AgentMessage) -> ValidationResult {
        match self.client.validate_message_signature(message).await {
            Ok(result) => result,
            Err(e) => {
                let mut result = ValidationResult::new();
                if self.fail_closed {
                    result.add_error(format!("Policy registry unreachable (fail-closed): {e}"));
                } else {
                    result.add_warning(format!("Policy registry unreachable (fail-open): {e}"));
                }
                result
            }
        }
    }

    fn name(&self) -> &str {
        "dynamic_policy"
    }
}

/// Delegates to OPA policy evaluation at `data.acgs.constitutional.validate`.
/// Fail-closed on any transport error, timeout, or hash mismatch.
pub struct OpaValidator {
    pub client: OpaClient,
}

impl OpaValidator {
    pub fn new(client: OpaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Validator for OpaValidator {
    async fn validate(&self, message: &AgentMessage) -> ValidationResult {
        match self.client.validate_constitutional(message).await {
            Ok(result) => result,
            Err(e) => {
                let mut result = ValidationResult::new();
                result.add_error(format!("OPA service unavailable: {e}"));
                result
            }
        }
    }

    fn name(&self) -> &str {
        "opa"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_validator_fails_on_empty_content() {
        let v = StaticHashValidator::new(true);
        let msg = AgentMessage::new("a", "b", "t1");
        let result = v.validate(&msg).await;
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("content")));
    }

    #[tokio::test]
    async fn static_validator_masks_hash_mismatch() {
        let v = StaticHashValidator::new(true);
        let mut msg = AgentMessage::new("a", "b", "t1");
        msg.content.insert("x".into(), "y".into());
        msg.constitutional_hash = "0000000000000000".to_string();
        let result = v.validate(&msg).await;
        assert!(!result.is_valid);
        let joined = result.errors.join(" ");
        assert!(joined.starts_with("Constitutional hash mismatch") || joined.contains("Constitutional hash mismatch"));
        assert!(!joined.contains(CONSTITUTIONAL_HASH));
    }

    #[tokio::test]
    async fn non_strict_mode_skips_hash_check() {
        let v = StaticHashValidator::new(false);
        let mut msg = AgentMessage::new("a", "b", "t1");
        msg.content.insert("x".into(), "y".into());
        msg.constitutional_hash = "0000000000000000".to_string();
        let result = v.validate(&msg).await;
        assert!(result.is_valid);
    }
}
