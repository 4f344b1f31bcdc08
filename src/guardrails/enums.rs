//! Guardrail enums, ported 1:1 from `guardrails/enums.py`'s intent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailLayer {
    RateLimiter,
    InputSanitizer,
    AgentEngine,
    ToolRunnerSandbox,
    OutputVerifier,
    AuditLog,
}

impl GuardrailLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailLayer::RateLimiter => "rate_limiter",
            GuardrailLayer::InputSanitizer => "input_sanitizer",
            GuardrailLayer::AgentEngine => "agent_engine",
            GuardrailLayer::ToolRunnerSandbox => "tool_runner_sandbox",
            GuardrailLayer::OutputVerifier => "output_verifier",
            GuardrailLayer::AuditLog => "audit_log",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyAction {
    Allow,
    Block,
    Modify,
    Escalate,
    Sandbox,
    Audit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}
