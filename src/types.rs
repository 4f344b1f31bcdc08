//! Core data model: `AgentMessage`, `AgentRecord`, `ValidationResult`, `DecisionLog`.
//!
//! Field shapes follow the teacher's `lib.rs` structs, broadened with the
//! tenant/routing/decision-log fields the distilled spec requires.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Constitutional hash for governance compliance; 16 hex chars.
pub const CONSTITUTIONAL_HASH: &str = "cdd01ef066bc6cf2";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Command,
    Query,
    Response,
    Event,
    Notification,
    Heartbeat,
    GovernanceRequest,
    GovernanceResponse,
    ConstitutionalValidation,
    TaskRequest,
    TaskResponse,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Command => "COMMAND",
            MessageType::Query => "QUERY",
            MessageType::Response => "RESPONSE",
            MessageType::Event => "EVENT",
            MessageType::Notification => "NOTIFICATION",
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::GovernanceRequest => "GOVERNANCE_REQUEST",
            MessageType::GovernanceResponse => "GOVERNANCE_RESPONSE",
            MessageType::ConstitutionalValidation => "CONSTITUTIONAL_VALIDATION",
            MessageType::TaskRequest => "TASK_REQUEST",
            MessageType::TaskResponse => "TASK_RESPONSE",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    Expired,
    PendingDeliberation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingContext {
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub routing_key: String,
    pub routing_tags: Vec<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_ms: i32,
    pub constitutional_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub content: HashMap<String, String>,
    pub payload: HashMap<String, String>,
    pub from_agent: String,
    pub to_agent: String,
    pub sender_id: String,
    pub message_type: MessageType,
    pub routing: Option<RoutingContext>,
    pub headers: HashMap<String, String>,
    pub tenant_id: String,
    pub security_context: HashMap<String, String>,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub constitutional_hash: String,
    pub constitutional_validated: bool,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: Option<String>,
    pub impact_score: Option<f32>,
    pub performance_metrics: HashMap<String, String>,
}

impl AgentMessage {
    pub fn new(from_agent: impl Into<String>, to_agent: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            message_id: Uuid::new_v4().to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            content: HashMap::new(),
            payload: HashMap::new(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            sender_id: String::new(),
            message_type: MessageType::Command,
            routing: None,
            headers: HashMap::new(),
            tenant_id: tenant_id.into(),
            security_context: HashMap::new(),
            priority: MessagePriority::Normal,
            status: MessageStatus::Pending,
            constitutional_hash: CONSTITUTIONAL_HASH.to_string(),
            constitutional_validated: false,
            created_at: now.clone(),
            updated_at: now,
            expires_at: None,
            impact_score: None,
            performance_metrics: HashMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json_str: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json_str)
    }

    /// Whether this message's status is terminal (spec §3 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, MessageStatus::Delivered | MessageStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub tenant_id: String,
    pub registered_at: String,
    pub constitutional_key: String,
    pub status: AgentStatus,
    pub updated_at: String,
}

impl AgentRecord {
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            capabilities,
            tenant_id: tenant_id.into(),
            registered_at: now.clone(),
            constitutional_key: CONSTITUTIONAL_HASH.to_string(),
            status: AgentStatus::Active,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub decision: Decision,
    pub constitutional_hash: String,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: HashMap::new(),
            decision: Decision::Allow,
            constitutional_hash: CONSTITUTIONAL_HASH.to_string(),
        }
    }

    pub fn deny(error: impl Into<String>) -> Self {
        let mut r = Self::new();
        r.add_error(error);
        r
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
        self.decision = Decision::Deny;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// AND-aggregate merge: distinct from the composite *processing* strategy's
    /// ordered fallback — this one combines every validator's opinion.
    pub fn merge(&mut self, other: &ValidationResult) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
        for (k, v) in &other.metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
        if !other.is_valid {
            self.is_valid = false;
            self.decision = Decision::Deny;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: String,
    pub tenant_id: String,
    pub policy_version: String,
    pub risk_score: f32,
    pub decision: Decision,
    pub constitutional_hash: String,
    pub compliance_tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub timestamp: String,
}

impl DecisionLog {
    pub fn build(message: &AgentMessage, result: &ValidationResult, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: message.message_id.clone(),
            span_id: span_id.into(),
            agent_id: message.from_agent.clone(),
            tenant_id: message.tenant_id.clone(),
            policy_version: CONSTITUTIONAL_HASH.to_string(),
            risk_score: message.impact_score.unwrap_or(0.0),
            decision: result.decision,
            constitutional_hash: result.constitutional_hash.clone(),
            compliance_tags: compliance_tags(message, result),
            metadata: result.metadata.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Compliance tag heuristics (eu-ai-act-high-risk / nist-rmf-high-impact /
/// constitutional-violation), ported from `core.py::_get_compliance_tags`.
fn compliance_tags(message: &AgentMessage, result: &ValidationResult) -> Vec<String> {
    let mut tags = Vec::new();
    if message.impact_score.unwrap_or(0.0) >= 0.8 {
        tags.push("eu-ai-act-high-risk".to_string());
        tags.push("nist-rmf-high-impact".to_string());
    }
    if !result.is_valid {
        tags.push("constitutional-violation".to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let mut msg = AgentMessage::new("agent-a", "agent-b", "t1");
        msg.content.insert("k".to_string(), "v".to_string());
        msg.priority = MessagePriority::High;
        let json = msg.to_json().unwrap();
        let back = AgentMessage::from_json(&json).unwrap();
        assert_eq!(msg.message_id, back.message_id);
        assert_eq!(msg.created_at, back.created_at);
        assert_eq!(msg.content, back.content);
        assert_eq!(back.priority, MessagePriority::High);
    }

    #[test]
    fn merge_is_and_aggregate() {
        let mut a = ValidationResult::new();
        let mut b = ValidationResult::new();
        b.add_error("bad");
        a.merge(&b);
        assert!(!a.is_valid);
        assert_eq!(a.errors, vec!["bad".to_string()]);
    }

    #[test]
    fn terminal_status() {
        let mut msg = AgentMessage::new("a", "b", "t1");
        assert!(!msg.is_terminal());
        msg.status = MessageStatus::Delivered;
        assert!(msg.is_terminal());
    }
}
