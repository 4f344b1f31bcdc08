//! Guardrail result/violation models, ported from `guardrails/models.py`'s
//! intent plus the `to_dict()` shape `runtime_safety_guardrails.py` relies on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::enums::{GuardrailLayer, SafetyAction, ViolationSeverity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub layer: GuardrailLayer,
    pub violation_type: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub details: HashMap<String, String>,
    pub trace_id: String,
}

impl Violation {
    pub fn new(
        layer: GuardrailLayer,
        violation_type: impl Into<String>,
        severity: ViolationSeverity,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            layer,
            violation_type: violation_type.into(),
            severity,
            message: message.into(),
            details: HashMap::new(),
            trace_id: trace_id.into(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub action: SafetyAction,
    pub allowed: bool,
    pub violations: Vec<Violation>,
    pub modified_data: Option<String>,
    pub metadata: HashMap<String, String>,
    pub processing_time_ms: f64,
    pub trace_id: String,
}

impl GuardrailResult {
    pub fn allow(trace_id: impl Into<String>) -> Self {
        Self {
            action: SafetyAction::Allow,
            allowed: true,
            violations: Vec::new(),
            modified_data: None,
            metadata: HashMap::new(),
            processing_time_ms: 0.0,
            trace_id: trace_id.into(),
        }
    }

    pub fn block(violations: Vec<Violation>, trace_id: impl Into<String>) -> Self {
        Self {
            action: SafetyAction::Block,
            allowed: false,
            violations,
            modified_data: None,
            metadata: HashMap::new(),
            processing_time_ms: 0.0,
            trace_id: trace_id.into(),
        }
    }

    pub fn has_critical(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Critical)
    }
}
