//! Layer 4: Tool Runner Sandbox — simulated isolated execution with resource
//! limits. Ported from `runtime_safety_guardrails.py`'s `ToolRunnerSandbox`
//! (`_execute_in_sandbox` mock); a concrete process/container backend is out
//! of scope, but the resource-limit and denylist contract is real.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::enums::{GuardrailLayer, ViolationSeverity};
use super::models::{GuardrailResult, Violation};

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub max_execution_time: Duration,
    pub max_memory_mb: usize,
    pub denied_tools: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_execution_time: Duration::from_secs(30),
            max_memory_mb: 512,
            denied_tools: vec!["shell_exec".into(), "file_delete".into()],
        }
    }
}

pub struct ToolRunnerSandbox {
    pub config: SandboxConfig,
}

impl ToolRunnerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn layer(&self) -> GuardrailLayer {
        GuardrailLayer::ToolRunnerSandbox
    }

    pub fn process(&self, context: &HashMap<String, String>) -> GuardrailResult {
        let start = Instant::now();
        let trace_id = context.get("trace_id").cloned().unwrap_or_default();

        let Some(tool_name) = context.get("tool_name") else {
            let mut r = GuardrailResult::allow(trace_id);
            r.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
            return r;
        };

        if self.config.denied_tools.contains(tool_name) {
            return GuardrailResult::block(
                vec![Violation::new(
                    self.layer(),
                    "denied_tool",
                    ViolationSeverity::Critical,
                    format!("Tool {tool_name} is not permitted to execute"),
                    &trace_id,
                )],
                trace_id,
            );
        }

        // Real execution happens elsewhere; this layer only enforces policy
        // and reports the resource envelope the call must respect.
        let mut r = GuardrailResult::allow(trace_id);
        r.metadata
            .insert("max_execution_ms".to_string(), self.config.max_execution_time.as_millis().to_string());
        r.metadata
            .insert("max_memory_mb".to_string(), self.config.max_memory_mb.to_string());
        r.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_tool_is_blocked() {
        let sandbox = ToolRunnerSandbox::new(SandboxConfig::default());
        let mut ctx = HashMap::new();
        ctx.insert("tool_name".to_string(), "shell_exec".to_string());
        let result = sandbox.process(&ctx);
        assert!(!result.allowed);
    }

    #[test]
    fn allowed_tool_passes_with_resource_envelope() {
        let sandbox = ToolRunnerSandbox::new(SandboxConfig::default());
        let mut ctx = HashMap::new();
        ctx.insert("tool_name".to_string(), "web_search".to_string());
        let result = sandbox.process(&ctx);
        assert!(result.allowed);
        assert!(result.metadata.contains_key("max_memory_mb"));
    }
}
