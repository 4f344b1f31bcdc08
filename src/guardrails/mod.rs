//! Guardrail Pipeline (§4.5): six ordered safety layers wrapped by a single
//! orchestrator with a global timeout and fail-closed halting.

pub mod agent_engine;
pub mod audit_log;
pub mod enums;
pub mod input_sanitizer;
pub mod models;
pub mod output_verifier;
pub mod pipeline;
pub mod rate_limiter;
pub mod sandbox;

pub use enums::{GuardrailLayer, SafetyAction, ViolationSeverity};
pub use models::{GuardrailResult, Violation};
pub use pipeline::{GuardrailPipelineConfig, PipelineOutcome, RuntimeSafetyGuardrails};
