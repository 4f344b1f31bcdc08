//! Policy client RPC (abstract), §6: `validate_message_signature`,
//! `get_current_public_key`, `health_check`. Concrete signature verification
//! against a real policy-registry service is out of scope (spec §1); this
//! module provides the trait plus an in-memory test double that exercises
//! the contract deterministically.

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{AgentMessage, ValidationResult};

#[async_trait]
pub trait PolicyRegistry: Send + Sync {
    async fn validate_message_signature(&self, message: &AgentMessage) -> Result<ValidationResult, String>;
    async fn get_current_public_key(&self) -> Result<String, String>;
    async fn health_check(&self) -> Result<String, String>;
}

/// Always-available in-memory stand-in. Accepts any message whose
/// `constitutional_hash` matches the configured current key; otherwise
/// denies. Grounded on `original_source/registry.py::DynamicPolicyValidationStrategy`,
/// which in turn delegates to an (unretrieved) policy-registry RPC stub.
pub struct StaticKeyPolicyRegistry {
    pub current_key: String,
}

impl StaticKeyPolicyRegistry {
    pub fn new(current_key: impl Into<String>) -> Self {
        Self {
            current_key: current_key.into(),
        }
    }
}

#[async_trait]
impl PolicyRegistry for StaticKeyPolicyRegistry {
    async fn validate_message_signature(&self, message: &AgentMessage) -> Result<ValidationResult, String> {
        let mut result = ValidationResult::new();
        if message.constitutional_hash != self.current_key {
            result.add_error("dynamic policy signature verification failed");
        }
        Ok(result)
    }

    async fn get_current_public_key(&self) -> Result<String, String> {
        Ok(self.current_key.clone())
    }

    async fn health_check(&self) -> Result<String, String> {
        Ok("healthy".to_string())
    }
}

/// Shareable handle used by `DynamicPolicyValidator`/`DynamicPolicyStrategy`.
#[derive(Clone)]
pub struct PolicyClient {
    inner: Arc<dyn PolicyRegistry>,
}

impl PolicyClient {
    pub fn new(inner: Arc<dyn PolicyRegistry>) -> Self {
        Self { inner }
    }

    pub async fn validate_message_signature(&self, message: &AgentMessage) -> Result<ValidationResult, String> {
        self.inner.validate_message_signature(message).await
    }

    pub async fn get_current_public_key(&self) -> Result<String, String> {
        self.inner.get_current_public_key().await
    }

    pub async fn health_check(&self) -> Result<String, String> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_matching_key() {
        let registry = StaticKeyPolicyRegistry::new("cdd01ef066bc6cf2");
        let mut msg = AgentMessage::new("a", "b", "t1");
        msg.constitutional_hash = "cdd01ef066bc6cf2".to_string();
        let result = registry.validate_message_signature(&msg).await.unwrap();
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn denies_mismatched_key() {
        let registry = StaticKeyPolicyRegistry::new("cdd01ef066bc6cf2");
        let mut msg = AgentMessage::new("a", "b", "t1");
        msg.constitutional_hash = "deadbeefdeadbeef".to_string();
        let result = registry.validate_message_signature(&msg).await.unwrap();
        assert!(!result.is_valid);
    }
}
