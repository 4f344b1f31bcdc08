//! Kafka bridge (§6): `KafkaBridge` trait plus an in-process stand-in
//! exercising publish/poll semantics. A concrete broker connection is out of
//! scope (§1) — `InProcessKafkaBridge` models topic naming
//! (`agent.{tenant}.{message_type}`) and offset-commit-after-enqueue
//! ordering against an in-memory queue so callers exercise the real
//! contract.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{BusError, BusResult};
use crate::types::AgentMessage;

#[async_trait]
pub trait KafkaBridge: Send + Sync {
    async fn publish(&self, message: &AgentMessage) -> BusResult<()>;
    /// Pops and commits the next buffered message, if any.
    async fn poll(&self) -> BusResult<Option<AgentMessage>>;
    fn is_enabled(&self) -> bool;
}

pub fn topic_name(message: &AgentMessage) -> String {
    let tenant = if message.tenant_id.is_empty() {
        "default"
    } else {
        message.tenant_id.as_str()
    };
    format!("agent.{tenant}.{}", message.message_type.as_str())
}

/// In-process stand-in: `publish` appends to a FIFO queue (topic is
/// recorded but not partitioned), `poll` pops the oldest entry — offset
/// commit is implicit in the pop since there is no replay.
pub struct InProcessKafkaBridge {
    enabled: bool,
    queue: Mutex<Vec<(String, AgentMessage)>>,
}

impl InProcessKafkaBridge {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            queue: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl KafkaBridge for InProcessKafkaBridge {
    async fn publish(&self, message: &AgentMessage) -> BusResult<()> {
        if !self.enabled {
            return Err(BusError::KafkaProduceFailed("bridge disabled".to_string()));
        }
        let topic = topic_name(message);
        self.queue.lock().await.push((topic, message.clone()));
        Ok(())
    }

    async fn poll(&self) -> BusResult<Option<AgentMessage>> {
        if !self.enabled {
            return Ok(None);
        }
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return Ok(None);
        }
        let (_, message) = queue.remove(0);
        Ok(Some(message))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
