//! Router (§4.3). Grounded on `original_source/registry.py`'s
//! `DirectMessageRouter` (tenant-aware `route`, tenant-UNaware `broadcast` —
//! tenant filtering is applied by the caller, here centralized in
//! `broadcast_targets` so both router variants share the same invariant)
//! and `CapabilityBasedRouter`.

use async_trait::async_trait;

use crate::registry::AgentRegistry;
use crate::types::AgentMessage;

#[async_trait]
pub trait Router: Send + Sync {
    /// Picks a single delivery target given a message + registry. Returns
    /// `None` if no eligible target exists (e.g. tenant mismatch, or no
    /// capable agent found) — callers must treat that as "not routed", not
    /// an error.
    async fn route(&self, message: &AgentMessage, registry: &dyn AgentRegistry) -> Option<String>;

    fn name(&self) -> &str;
}

/// Direct delivery: `target = msg.to_agent` iff present in the registry and
/// tenants match (critical invariant, §5 #1).
pub struct DirectRouter;

#[async_trait]
impl Router for DirectRouter {
    async fn route(&self, message: &AgentMessage, registry: &dyn AgentRegistry) -> Option<String> {
        if message.to_agent.is_empty() {
            return None;
        }
        let record = registry.get(&message.to_agent).await.ok().flatten()?;
        if record.tenant_id != message.tenant_id {
            tracing::warn!(
                to_agent = %message.to_agent,
                msg_tenant = %message.tenant_id,
                recipient_tenant = %record.tenant_id,
                "direct route blocked by tenant mismatch"
            );
            return None;
        }
        Some(record.agent_id)
    }

    fn name(&self) -> &str {
        "direct"
    }
}

/// Capability-based delivery: used when `msg.to_agent` is absent; searches
/// the registry for an agent whose capability set is a superset of
/// `msg.content["required_capabilities"]` (comma-separated).
pub struct CapabilityRouter;

#[async_trait]
impl Router for CapabilityRouter {
    async fn route(&self, message: &AgentMessage, registry: &dyn AgentRegistry) -> Option<String> {
        if !message.to_agent.is_empty() {
            return None;
        }
        let required: Vec<&str> = message
            .content
            .get("required_capabilities")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if required.is_empty() {
            return None;
        }

        for agent_id in registry.list_agents().await.ok()?.into_iter() {
            if let Ok(Some(record)) = registry.get(&agent_id).await {
                if record.tenant_id != message.tenant_id {
                    continue;
                }
                if required.iter().all(|req| record.capabilities.iter().any(|c| c == req)) {
                    return Some(record.agent_id);
                }
            }
        }
        None
    }

    fn name(&self) -> &str {
        "capability"
    }
}

/// Broadcast recipients after tenant filtering and excluding the sender
/// (§4.3 `Broadcast`).
pub async fn broadcast_targets(
    message: &AgentMessage,
    registry: &dyn AgentRegistry,
    exclude: &str,
) -> Vec<String> {
    let mut targets = Vec::new();
    if let Ok(ids) = registry.list_agents().await {
        for agent_id in ids {
            if agent_id == exclude {
                continue;
            }
            if let Ok(Some(record)) = registry.get(&agent_id).await {
                if record.tenant_id == message.tenant_id {
                    targets.push(record.agent_id);
                }
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryAgentRegistry;
    use crate::types::AgentRecord;

    async fn seeded_registry() -> InMemoryAgentRegistry {
        let registry = InMemoryAgentRegistry::new();
        registry
            .register(AgentRecord::new("b1", "t", vec!["python".into()], "t1"))
            .await
            .unwrap();
        registry
            .register(AgentRecord::new("b2", "t", vec![], "t2"))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn direct_router_respects_tenant_isolation() {
        let registry = seeded_registry().await;
        let router = DirectRouter;

        let mut msg = AgentMessage::new("a1", "b1", "t1");
        assert_eq!(router.route(&msg, &registry).await, Some("b1".to_string()));

        msg.to_agent = "b2".to_string();
        assert_eq!(router.route(&msg, &registry).await, None);
    }

    #[tokio::test]
    async fn capability_router_finds_matching_agent() {
        let registry = seeded_registry().await;
        let router = CapabilityRouter;

        let mut msg = AgentMessage::new("a1", "", "t1");
        msg.content.insert("required_capabilities".into(), "python".into());
        assert_eq!(router.route(&msg, &registry).await, Some("b1".to_string()));
    }

    #[tokio::test]
    async fn broadcast_excludes_sender_and_other_tenants() {
        let registry = seeded_registry().await;
        registry
            .register(AgentRecord::new("b3", "t", vec![], "t1"))
            .await
            .unwrap();
        let msg = AgentMessage::new("b1", "", "t1");
        let mut targets = broadcast_targets(&msg, &registry, "b1").await;
        targets.sort();
        assert_eq!(targets, vec!["b3".to_string()]);
    }
}
