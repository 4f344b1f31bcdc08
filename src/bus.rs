//! Agent Bus (§4.10): lifecycle, registration (with identity proof),
//! send/broadcast/receive, Kafka bridge. Grounded in full on
//! `original_source/agent_bus.py`'s `EnhancedAgentBus`, de-duplicating the
//! `_agents`-dict-vs-registry inconsistency noted there by having the
//! registry be the single source of truth.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::BusConfig;
use crate::deliberation::DeliberationQueue;
use crate::error::{BusError, BusResult};
use crate::kafka::KafkaBridge;
use crate::metrics::BusMetrics;
use crate::processor::MessageProcessor;
use crate::registry::AgentRegistry;
use crate::router::{broadcast_targets, DirectRouter, Router};
use crate::strategy::HandlerMap;
use crate::types::{AgentRecord, AgentMessage, MessageStatus, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BusState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl BusState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BusState::Starting,
            2 => BusState::Running,
            3 => BusState::Stopping,
            _ => BusState::Stopped,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            BusState::Stopped => "stopped",
            BusState::Starting => "starting",
            BusState::Running => "running",
            BusState::Stopping => "stopping",
        }
    }
}

/// Verifies an identity token's claims against the register request.
/// Concrete JWT/SVID cryptography is out of scope (§1); this trait models
/// the contract a real verifier would satisfy.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str, agent_id: &str, tenant_id: &str) -> BusResult<Vec<String>>;
}

/// Always-accept test double: returns no capability claims, used when no
/// verifier is configured and dynamic-policy mode is not in effect.
pub struct NullIdentityVerifier;

#[async_trait]
impl IdentityVerifier for NullIdentityVerifier {
    async fn verify(&self, _token: &str, _agent_id: &str, _tenant_id: &str) -> BusResult<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct AgentBus {
    state: AtomicU8,
    registry: Arc<dyn AgentRegistry>,
    router: Arc<dyn Router>,
    processor: Arc<MessageProcessor>,
    kafka: Arc<dyn KafkaBridge>,
    identity_verifier: Arc<dyn IdentityVerifier>,
    handlers: HandlerMap,
    queue_tx: mpsc::UnboundedSender<AgentMessage>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<AgentMessage>>,
    deliberation_queue: Arc<DeliberationQueue>,
    requires_token: bool,
    use_kafka: bool,
    metrics: Arc<BusMetrics>,
}

impl AgentBus {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        processor: Arc<MessageProcessor>,
        kafka: Arc<dyn KafkaBridge>,
        identity_verifier: Arc<dyn IdentityVerifier>,
        metrics: Arc<BusMetrics>,
        config: &BusConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            state: AtomicU8::new(BusState::Stopped as u8),
            registry,
            router: Arc::new(DirectRouter),
            processor,
            kafka,
            identity_verifier,
            handlers: HandlerMap::new(),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            deliberation_queue: Arc::new(DeliberationQueue::new()),
            requires_token: config.dynamic_policy_requires_token,
            use_kafka: config.kafka_enabled,
            metrics,
        }
    }

    /// §4.9 / §8 invariant 4 metrics shared with the [`MessageProcessor`].
    pub fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }

    /// The external approval-chain engine polls this queue for messages
    /// diverted by the processor (§4.8).
    pub fn deliberation_queue(&self) -> &Arc<DeliberationQueue> {
        &self.deliberation_queue
    }

    pub fn state(&self) -> BusState {
        BusState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: BusState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Initialises registry/Kafka bridge/policy clients (already constructed
    /// and injected) and transitions to `running`. Idempotent.
    pub async fn start(&self) -> BusResult<()> {
        if self.state() == BusState::Running {
            return Ok(());
        }
        self.set_state(BusState::Starting);
        self.set_state(BusState::Running);
        Ok(())
    }

    fn ensure_running(&self) -> BusResult<()> {
        if self.state() != BusState::Running {
            return Err(BusError::NotStarted(self.state().as_str().to_string()));
        }
        Ok(())
    }

    /// Registers an agent. If a token is supplied, verifies its claims
    /// against the request; dynamic-policy mode requires a token.
    pub async fn register(
        &self,
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
        tenant_id: impl Into<String>,
        token: Option<&str>,
    ) -> BusResult<AgentRecord> {
        self.ensure_running()?;
        let agent_id = agent_id.into();
        let tenant_id = tenant_id.into();

        if self.requires_token && token.is_none() {
            return Err(BusError::InvalidToken("dynamic-policy mode requires a token".to_string()));
        }

        let resolved_capabilities = match token {
            Some(t) => {
                let claimed = self.identity_verifier.verify(t, &agent_id, &tenant_id).await?;
                if claimed.is_empty() {
                    capabilities
                } else {
                    claimed
                }
            }
            None => capabilities,
        };

        let record = AgentRecord::new(agent_id.clone(), agent_type, resolved_capabilities, tenant_id);
        if !self.registry.register(record.clone()).await? {
            return Err(BusError::AgentAlreadyRegistered(agent_id));
        }
        Ok(record)
    }

    pub async fn unregister(&self, agent_id: &str) -> BusResult<()> {
        self.ensure_running()?;
        if !self.registry.unregister(agent_id).await? {
            return Err(BusError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    pub fn register_handler(
        &self,
        message_type: crate::types::MessageType,
        handler: crate::strategy::AsyncHandler,
    ) {
        self.handlers.entry(message_type).or_default().push(handler);
    }

    /// §4.10 Send: tenant check → process → deliberation divert →
    /// Kafka-or-local routing → (fire-and-forget audit already happened in
    /// the processor).
    pub async fn send(&self, mut message: AgentMessage) -> BusResult<ValidationResult> {
        self.ensure_running()?;

        if !message.to_agent.is_empty() {
            if let Some(recipient) = self.registry.get(&message.to_agent).await? {
                if recipient.tenant_id != message.tenant_id {
                    self.metrics.record_send_result(false);
                    return Err(BusError::TenantMismatch {
                        msg_tenant: message.tenant_id.clone(),
                        recipient_tenant: recipient.tenant_id,
                    });
                }
            }
        }

        let result = self.processor.process(&mut message, &self.handlers).await;
        if !result.is_valid {
            self.metrics.record_send_result(false);
            return Ok(result);
        }

        if message.status == MessageStatus::PendingDeliberation {
            self.deliberation_queue
                .enqueue(message.clone(), message.impact_score.unwrap_or(0.0));
            self.metrics.record_send_result(true);
            return Ok(result);
        }

        if self.use_kafka {
            if let Err(e) = self.kafka.publish(&message).await {
                self.metrics.record_send_result(false);
                return Err(e);
            }
        }

        let target = self.router.route(&message, self.registry.as_ref()).await;
        if target.is_some() {
            self.metrics.incr_queue_depth();
            let _ = self.queue_tx.send(message);
        }

        self.metrics.record_send_result(true);
        Ok(result)
    }

    /// §4.10 Broadcast: tenant pre-filter, sender excluded.
    pub async fn broadcast(&self, message: AgentMessage) -> BusResult<HashMap<String, ValidationResult>> {
        self.ensure_running()?;
        let targets = broadcast_targets(&message, self.registry.as_ref(), &message.from_agent).await;

        let mut results = HashMap::new();
        for target in targets {
            let mut copy = message.clone();
            copy.to_agent = target.clone();
            let result = self.processor.process(&mut copy, &self.handlers).await;
            results.insert(target, result);
        }
        Ok(results)
    }

    /// §4.10 Receive: blocks on the internal queue up to `timeout_duration`.
    pub async fn receive(&self, timeout_duration: Duration) -> BusResult<Option<AgentMessage>> {
        self.ensure_running()?;
        let mut rx = self.queue_rx.lock().await;
        match timeout(timeout_duration, rx.recv()).await {
            Ok(Some(msg)) => {
                self.metrics.decr_queue_depth();
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    /// Idempotent shutdown.
    pub async fn stop(&self) -> BusResult<()> {
        if self.state() == BusState::Stopped {
            return Ok(());
        }
        self.set_state(BusState::Stopping);
        self.set_state(BusState::Stopped);
        Ok(())
    }
}
