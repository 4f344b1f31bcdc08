//! Multi-tenant agent message bus with constitutional validation, impact
//! scoring and deliberation divert.
//!
//! The crate is organised around a `send` pipeline: a message enters
//! through [`bus::AgentBus`], is checked for prompt injection and routed
//! through a [`strategy::ProcessingStrategy`] fallback chain for
//! constitutional validation, scored for impact by [`impact::ImpactScorer`],
//! and either diverted to the [`deliberation::DeliberationQueue`] or
//! dispatched to registered handlers. A separate, independently invokable
//! [`guardrails::RuntimeSafetyGuardrails`] pipeline applies rate-limiting,
//! input/output sanitisation and sandboxing around agent tool calls.

pub mod audit;
pub mod bus;
pub mod config;
pub mod deliberation;
pub mod error;
pub mod feedback;
pub mod guardrails;
pub mod impact;
pub mod kafka;
pub mod metrics;
pub mod opa;
pub mod policy;
pub mod processor;
pub mod registry;
pub mod router;
pub mod security;
pub mod strategy;
pub mod types;
pub mod validator;

use std::sync::Arc;

use bus::{AgentBus, IdentityVerifier, NullIdentityVerifier};
use config::BusConfig;
use error::BusResult;
use impact::ImpactScorer;
use kafka::{InProcessKafkaBridge, KafkaBridge};
use metrics::BusMetrics;
use opa::OpaClient;
use policy::PolicyClient;
use processor::MessageProcessor;
use registry::{AgentRegistry, InMemoryAgentRegistry};
use strategy::CompositeStrategy;

pub use error::BusError;
pub use types::{
    AgentMessage, AgentRecord, AgentStatus, Decision, DecisionLog, MessagePriority, MessageStatus,
    MessageType, RoutingContext, ValidationResult, CONSTITUTIONAL_HASH,
};

/// Builds a fully-wired [`AgentBus`] from configuration alone: an in-memory
/// registry, the default Rust → OPA → Dynamic-Policy → StaticHash
/// processing chain, an in-process Kafka bridge and no identity
/// verification. Sufficient for tests, a single-process deployment, or as
/// the starting point for wiring real backends (Redis registry, a live
/// OPA endpoint, a JWT/SVID identity verifier) in front of production.
pub fn default_bus(config: BusConfig) -> BusResult<AgentBus> {
    let registry: Arc<dyn AgentRegistry> = Arc::new(InMemoryAgentRegistry::new());

    let opa_client = OpaClient::new(config.opa_url.clone().unwrap_or_default(), config.opa_timeout)
        .with_fail_closed(config.opa_fail_closed);
    let policy_client: Option<PolicyClient> = None;
    let strategy = Arc::new(CompositeStrategy::default_chain(opa_client, policy_client, config.opa_fail_closed));

    let scorer = Arc::new(ImpactScorer::new(None, &config));
    let audit_url = config.audit_url.clone().unwrap_or_else(|| "http://localhost:8080/audit".to_string());
    let audit_client = Arc::new(audit::AuditClient::new(audit_url, config.audit_timeout));

    let metrics = Arc::new(BusMetrics::new());
    let processor = Arc::new(MessageProcessor::new(
        strategy,
        scorer,
        audit_client,
        config.deliberation_threshold,
        metrics.clone(),
    ));

    let kafka: Arc<dyn KafkaBridge> = Arc::new(InProcessKafkaBridge::new(config.kafka_enabled));
    let identity_verifier: Arc<dyn IdentityVerifier> = Arc::new(NullIdentityVerifier);

    Ok(AgentBus::new(registry, processor, kafka, identity_verifier, metrics, &config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_bus_starts_and_registers() {
        let bus = default_bus(BusConfig::default()).unwrap();
        bus.start().await.unwrap();
        let record = bus.register("agent-1", "coder", vec![], "tenant-a", None).await.unwrap();
        assert_eq!(record.agent_id, "agent-1");
        assert_eq!(record.constitutional_key, CONSTITUTIONAL_HASH);
    }
}
