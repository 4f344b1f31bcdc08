//! Processing Strategy (§4.4) — the composite fallback chain, the kernel's
//! key algorithm. Grounded on `original_source/registry.py`'s
//! `PythonProcessingStrategy`/`RustProcessingStrategy`/
//! `DynamicPolicyProcessingStrategy` (the `CompositeProcessingStrategy` and
//! `OPAProcessingStrategy` classes they reference are never defined in the
//! retrieved source, so both are authored here directly from the ordered
//! fallback pseudocode) and the teacher `lib.rs`'s handler-dispatch shape
//! (`AsyncHandler`, `DashMap<MessageType, Vec<AsyncHandler>>`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::opa::OpaClient;
use crate::policy::PolicyClient;
use crate::types::{AgentMessage, MessageStatus, MessageType, ValidationResult};
use crate::validator::{DynamicPolicyValidator, OpaValidator, StaticHashValidator, Validator};

pub type AsyncHandler =
    Arc<dyn Fn(AgentMessage) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;
pub type HandlerMap = DashMap<MessageType, Vec<AsyncHandler>>;

#[async_trait]
pub trait ProcessingStrategy: Send + Sync {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult;
    /// Validation only — no handler dispatch. Lets the message processor
    /// settle the deliberation-divert decision before any handler is
    /// allowed to run.
    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult;
    async fn is_available(&self) -> bool;
    fn name(&self) -> &str;
}

pub(crate) async fn execute_handlers(message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
    message.status = MessageStatus::Processing;
    message.touch();

    if let Some(message_handlers) = handlers.get(&message.message_type) {
        let futures: Vec<_> = message_handlers
            .iter()
            .map(|handler| handler(message.clone()))
            .collect();
        let results = futures::future::join_all(futures).await;
        if let Some(Err(e)) = results.into_iter().find(|r| r.is_err()) {
            message.status = MessageStatus::Failed;
            return ValidationResult::deny(format!("Handler error: {e}"));
        }
    }

    message.status = MessageStatus::Delivered;
    message.touch();
    ValidationResult::new()
}

/// `Static`: terminal fallback, always available.
pub struct StaticProcessingStrategy {
    validator: StaticHashValidator,
}

impl StaticProcessingStrategy {
    pub fn new(strict: bool) -> Self {
        Self {
            validator: StaticHashValidator::new(strict),
        }
    }
}

#[async_trait]
impl ProcessingStrategy for StaticProcessingStrategy {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
        let validation = self.validate_only(message).await;
        if !validation.is_valid {
            message.status = MessageStatus::Failed;
            return validation;
        }
        execute_handlers(message, handlers).await
    }

    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult {
        self.validator.validate(message).await
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// `Rust (native)`: same logic in-process, no marshalling boundary — the
/// whole kernel already runs natively, so this collapses to the static
/// validator's logic but is kept distinct to preserve the composite's
/// default ordering (§4.4).
pub struct RustProcessingStrategy {
    validator: StaticHashValidator,
}

impl RustProcessingStrategy {
    pub fn new() -> Self {
        Self {
            validator: StaticHashValidator::new(true),
        }
    }
}

impl Default for RustProcessingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingStrategy for RustProcessingStrategy {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
        let validation = self.validate_only(message).await;
        if !validation.is_valid {
            message.status = MessageStatus::Failed;
            return validation;
        }
        execute_handlers(message, handlers).await
    }

    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult {
        self.validator.validate(message).await
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "rust"
    }
}

/// `OPA`: constitutional validation performed via policy engine.
pub struct OpaProcessingStrategy {
    validator: OpaValidator,
}

impl OpaProcessingStrategy {
    pub fn new(client: OpaClient) -> Self {
        Self {
            validator: OpaValidator::new(client),
        }
    }
}

#[async_trait]
impl ProcessingStrategy for OpaProcessingStrategy {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
        let validation = self.validate_only(message).await;
        if !validation.is_valid {
            message.status = MessageStatus::Failed;
            return validation;
        }
        execute_handlers(message, handlers).await
    }

    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult {
        if !self.is_available().await {
            return ValidationResult::deny("OPA backend not available");
        }
        self.validator.validate(message).await
    }

    async fn is_available(&self) -> bool {
        self.validator.client.is_available()
    }

    fn name(&self) -> &str {
        "opa"
    }
}

/// `Dynamic-policy`: validation against the policy registry. Absence of a
/// configured `PolicyClient` makes this strategy unavailable so the
/// composite falls through to the terminal static-hash fallback.
pub struct DynamicPolicyProcessingStrategy {
    validator: Option<DynamicPolicyValidator>,
}

impl DynamicPolicyProcessingStrategy {
    pub fn new(policy_client: Option<PolicyClient>, fail_closed: bool) -> Self {
        let validator = policy_client.map(|client| DynamicPolicyValidator::new(client, fail_closed));
        Self { validator }
    }
}

#[async_trait]
impl ProcessingStrategy for DynamicPolicyProcessingStrategy {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
        let validation = self.validate_only(message).await;
        if !validation.is_valid {
            message.status = MessageStatus::Failed;
            return validation;
        }
        execute_handlers(message, handlers).await
    }

    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult {
        let Some(validator) = &self.validator else {
            return ValidationResult::deny("Policy client not available");
        };
        validator.validate(message).await
    }

    async fn is_available(&self) -> bool {
        self.validator.is_some()
    }

    fn name(&self) -> &str {
        "dynamic_policy"
    }
}

/// Whether an error is deterministic (must not be shadowed by the next
/// fallback child) vs transient/availability (triggers fallthrough). A
/// deterministic denial names a constitutional-hash mismatch or a
/// prompt-injection rejection; anything else (backend unavailable, RPC
/// timeout) is transient.
fn is_deterministic_denial(result: &ValidationResult) -> bool {
    result.errors.iter().any(|e| {
        e.contains("hash mismatch")
            || e.contains("prompt_injection")
            || e.contains("injection")
            || e.contains("message_id is empty")
            || e.contains("content must not be empty")
    })
}

/// Ordered fallback chain: `for each child, if available, process; return on
/// success or deterministic denial; otherwise fall through`. Default order
/// is Rust → OPA → Dynamic-Policy → StaticHash (§4.4).
pub struct CompositeStrategy {
    children: Vec<Box<dyn ProcessingStrategy>>,
}

impl CompositeStrategy {
    pub fn new(children: Vec<Box<dyn ProcessingStrategy>>) -> Self {
        Self { children }
    }

    /// Builds the default Rust → OPA → Dynamic-Policy → StaticHash chain.
    pub fn default_chain(
        opa_client: OpaClient,
        policy_client: Option<PolicyClient>,
        opa_fail_closed: bool,
    ) -> Self {
        Self::new(vec![
            Box::new(RustProcessingStrategy::new()),
            Box::new(OpaProcessingStrategy::new(opa_client)),
            Box::new(DynamicPolicyProcessingStrategy::new(policy_client, opa_fail_closed)),
            Box::new(StaticProcessingStrategy::new(true)),
        ])
    }
}

#[async_trait]
impl ProcessingStrategy for CompositeStrategy {
    async fn process(&self, message: &mut AgentMessage, handlers: &HandlerMap) -> ValidationResult {
        for child in &self.children {
            if !child.is_available().await {
                continue;
            }
            let result = child.process(message, handlers).await;
            if result.is_valid || is_deterministic_denial(&result) {
                return result;
            }
            tracing::debug!(strategy = child.name(), "transient failure, falling through");
        }
        ValidationResult::deny("all strategies failed")
    }

    /// Same ordered fallback as `process`, but never dispatches to a
    /// handler — used ahead of the deliberation-divert decision so a
    /// high-impact message can be validated without ever invoking a
    /// handler.
    async fn validate_only(&self, message: &AgentMessage) -> ValidationResult {
        for child in &self.children {
            if !child.is_available().await {
                continue;
            }
            let result = child.validate_only(message).await;
            if result.is_valid || is_deterministic_denial(&result) {
                return result;
            }
            tracing::debug!(strategy = child.name(), "transient failure, falling through");
        }
        ValidationResult::deny("all strategies failed")
    }

    async fn is_available(&self) -> bool {
        // The composite is available whenever at least the terminal
        // fallback is; StaticHash is always last and always available.
        true
    }

    fn name(&self) -> &str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handlers() -> HandlerMap {
        DashMap::new()
    }

    #[tokio::test]
    async fn static_strategy_runs_handlers_on_success() {
        let strategy = StaticProcessingStrategy::new(true);
        let mut message = AgentMessage::new("a1", "b1", "t1");
        message.content.insert("body".to_string(), "hi".to_string());
        let result = strategy.process(&mut message, &handlers()).await;
        assert!(result.is_valid);
        assert_eq!(message.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn composite_falls_through_unavailable_children_to_terminal() {
        struct Unavailable;
        #[async_trait]
        impl ProcessingStrategy for Unavailable {
            async fn process(&self, _m: &mut AgentMessage, _h: &HandlerMap) -> ValidationResult {
                unreachable!("must not be called when unavailable")
            }
            async fn validate_only(&self, _m: &AgentMessage) -> ValidationResult {
                unreachable!("must not be called when unavailable")
            }
            async fn is_available(&self) -> bool {
                false
            }
            fn name(&self) -> &str {
                "unavailable"
            }
        }

        let composite = CompositeStrategy::new(vec![
            Box::new(Unavailable),
            Box::new(StaticProcessingStrategy::new(true)),
        ]);
        let mut message = AgentMessage::new("a1", "b1", "t1");
        message.content.insert("body".to_string(), "hi".to_string());
        let result = composite.process(&mut message, &handlers()).await;
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn composite_short_circuits_on_deterministic_denial() {
        struct CallCount(Arc<AtomicUsize>);
        #[async_trait]
        impl ProcessingStrategy for CallCount {
            async fn process(&self, _m: &mut AgentMessage, _h: &HandlerMap) -> ValidationResult {
                self.0.fetch_add(1, Ordering::SeqCst);
                ValidationResult::deny("hash mismatch: deterministic")
            }
            async fn validate_only(&self, _m: &AgentMessage) -> ValidationResult {
                self.0.fetch_add(1, Ordering::SeqCst);
                ValidationResult::deny("hash mismatch: deterministic")
            }
            async fn is_available(&self) -> bool {
                true
            }
            fn name(&self) -> &str {
                "first"
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeStrategy::new(vec![
            Box::new(CallCount(calls.clone())),
            Box::new(StaticProcessingStrategy::new(true)),
        ]);
        let mut message = AgentMessage::new("a1", "b1", "t1");
        let result = composite.process(&mut message, &handlers()).await;
        assert!(!result.is_valid);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
