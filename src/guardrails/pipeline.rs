//! Guardrail Pipeline orchestrator (§4.5) — runs the six layers in strict
//! order under a global timeout, halting on `BLOCK` iff `fail_closed`.
//! Ported from `runtime_safety_guardrails.py`'s `RuntimeSafetyGuardrails`
//! orchestrator, with the Rate Limiter included in the iterated order
//! (the Python source only consulted it ad hoc; the layer order specified
//! here is authoritative).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::agent_engine::{AgentEngine, AgentEngineConfig};
use super::audit_log::{AuditLog, AuditLogConfig, AuditMetrics};
use super::enums::{GuardrailLayer, SafetyAction};
use super::input_sanitizer::{InputSanitizer, InputSanitizerConfig};
use super::models::GuardrailResult;
use super::output_verifier::{OutputVerifier, OutputVerifierConfig};
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::sandbox::{SandboxConfig, ToolRunnerSandbox};
use crate::error::{BusError, BusResult};
use crate::impact::ImpactScorer;
use crate::types::AgentMessage;

#[derive(Debug, Clone, Default)]
pub struct GuardrailPipelineConfig {
    pub rate_limiter: RateLimiterConfig,
    pub input_sanitizer: InputSanitizerConfig,
    pub agent_engine: AgentEngineConfig,
    pub sandbox: SandboxConfig,
    pub output_verifier: OutputVerifierConfig,
    pub audit_log: AuditLogConfig,
    pub strict_mode: bool,
    pub fail_closed: bool,
    pub timeout: Duration,
}

impl GuardrailPipelineConfig {
    pub fn with_defaults(timeout: Duration, fail_closed: bool) -> Self {
        Self {
            timeout,
            fail_closed,
            ..Default::default()
        }
    }
}

/// The result of running a message through every layer.
pub struct PipelineOutcome {
    pub final_action: SafetyAction,
    pub allowed: bool,
    pub layer_results: Vec<(GuardrailLayer, GuardrailResult)>,
    pub modified_content: Option<String>,
}

pub struct RuntimeSafetyGuardrails {
    config: GuardrailPipelineConfig,
    rate_limiter: RateLimiter,
    input_sanitizer: InputSanitizer,
    agent_engine: AgentEngine,
    sandbox: ToolRunnerSandbox,
    output_verifier: OutputVerifier,
    audit_log: AuditLog,
}

impl RuntimeSafetyGuardrails {
    pub fn new(config: GuardrailPipelineConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limiter.clone()),
            input_sanitizer: InputSanitizer::new(config.input_sanitizer.clone()),
            agent_engine: AgentEngine::new(config.agent_engine.clone()),
            sandbox: ToolRunnerSandbox::new(config.sandbox.clone()),
            output_verifier: OutputVerifier::new(config.output_verifier.clone()),
            audit_log: AuditLog::new(config.audit_log.clone()),
            config,
        }
    }

    pub fn get_layer(&self, layer: GuardrailLayer) -> &'static str {
        layer.as_str()
    }

    pub fn get_metrics(&self) -> AuditMetrics {
        self.audit_log.get_metrics()
    }

    /// Runs the message through all six layers in strict order. Returns
    /// `BusError::GuardrailTimeout` if the global timeout elapses.
    pub async fn process_request(
        &self,
        message: &AgentMessage,
        scorer: &ImpactScorer,
        context: &HashMap<String, String>,
    ) -> BusResult<PipelineOutcome> {
        let fut = self.run_layers(message, scorer, context);
        timeout(self.config.timeout, fut).await.map_err(|_| BusError::GuardrailTimeout {
            layer: "pipeline".to_string(),
            timeout_ms: self.config.timeout.as_millis() as u64,
        })
    }

    async fn run_layers(
        &self,
        message: &AgentMessage,
        scorer: &ImpactScorer,
        context: &HashMap<String, String>,
    ) -> PipelineOutcome {
        let content: String = message.content.values().cloned().collect::<Vec<_>>().join(" ");
        let trace_id = context
            .get("trace_id")
            .cloned()
            .unwrap_or_else(|| message.message_id.clone());

        let mut layer_results = Vec::new();
        let mut final_action = SafetyAction::Allow;
        let mut allowed = true;
        let mut modified_content: Option<String> = None;
        let mut working_content = content;

        macro_rules! record_and_check {
            ($layer:expr, $result:expr) => {{
                let result = $result;
                self.audit_log.record(&trace_id, $layer, &result);
                let halted = !result.allowed && self.config.fail_closed;
                if let Some(modified) = &result.modified_data {
                    working_content = modified.clone();
                    modified_content = Some(modified.clone());
                }
                if result.action == SafetyAction::Escalate {
                    final_action = SafetyAction::Escalate;
                }
                if !result.allowed {
                    allowed = false;
                    final_action = result.action;
                }
                layer_results.push(($layer, result));
                if halted {
                    let audit_result = GuardrailResult::allow(trace_id.clone());
                    self.audit_log.record(&trace_id, GuardrailLayer::AuditLog, &audit_result);
                    layer_results.push((GuardrailLayer::AuditLog, audit_result));
                    return PipelineOutcome {
                        final_action,
                        allowed,
                        layer_results,
                        modified_content,
                    };
                }
            }};
        }

        record_and_check!(GuardrailLayer::RateLimiter, self.rate_limiter.process(context));
        record_and_check!(
            GuardrailLayer::InputSanitizer,
            self.input_sanitizer.process(&working_content, context)
        );
        record_and_check!(
            GuardrailLayer::AgentEngine,
            self.agent_engine.process(message, scorer, context)
        );
        record_and_check!(GuardrailLayer::ToolRunnerSandbox, self.sandbox.process(context));
        record_and_check!(
            GuardrailLayer::OutputVerifier,
            self.output_verifier.process(&working_content, context)
        );

        let audit_result = GuardrailResult::allow(trace_id.clone());
        self.audit_log.record(&trace_id, GuardrailLayer::AuditLog, &audit_result);
        layer_results.push((GuardrailLayer::AuditLog, audit_result));

        PipelineOutcome {
            final_action,
            allowed,
            layer_results,
            modified_content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;

    fn scorer() -> ImpactScorer {
        ImpactScorer::new(None, &BusConfig::default())
    }

    #[tokio::test]
    async fn clean_message_passes_all_layers() {
        let pipeline = RuntimeSafetyGuardrails::new(GuardrailPipelineConfig::with_defaults(
            Duration::from_secs(15),
            true,
        ));
        let mut message = AgentMessage::new("a1", "b1", "t1");
        message
            .content
            .insert("body".to_string(), "please summarize the report".to_string());
        let outcome = pipeline
            .process_request(&message, &scorer(), &HashMap::new())
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.layer_results.len(), 6);
    }

    #[tokio::test]
    async fn injection_halts_pipeline_when_fail_closed() {
        let pipeline = RuntimeSafetyGuardrails::new(GuardrailPipelineConfig::with_defaults(
            Duration::from_secs(15),
            true,
        ));
        let mut message = AgentMessage::new("a1", "b1", "t1");
        message
            .content
            .insert("body".to_string(), "<script>alert(1)</script>".to_string());
        let outcome = pipeline
            .process_request(&message, &scorer(), &HashMap::new())
            .await
            .unwrap();
        assert!(!outcome.allowed);
        // Halted after input_sanitizer: rate_limiter + input_sanitizer + audit_log.
        assert_eq!(outcome.layer_results.len(), 3);
    }
}
