//! Layer 6: Audit Log — immutable in-pipeline audit trail and rolling
//! metrics. Ported from `runtime_safety_guardrails.py`'s `AuditLog`
//! (`_audit_entries`, `get_metrics()`, `get_entries(trace_id)`). Distinct
//! from the bus-level fire-and-forget `AuditClient`: this layer records
//! every guardrail decision for later inspection, in-process.

use parking_lot::RwLock;

use super::enums::GuardrailLayer;
use super::models::GuardrailResult;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub trace_id: String,
    pub layer: GuardrailLayer,
    pub allowed: bool,
    pub violation_count: usize,
    pub processing_time_ms: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuditMetrics {
    pub total_entries: usize,
    pub allowed_rate: f64,
    pub violation_rate: f64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

pub struct AuditLog {
    pub config: AuditLogConfig,
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new(config: AuditLogConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn layer(&self) -> GuardrailLayer {
        GuardrailLayer::AuditLog
    }

    /// Records a completed layer result. Never blocks or denies itself —
    /// the audit layer always allows (§4.5).
    pub fn record(&self, trace_id: &str, layer: GuardrailLayer, result: &GuardrailResult) {
        let entry = AuditEntry {
            trace_id: trace_id.to_string(),
            layer,
            allowed: result.allowed,
            violation_count: result.violations.len(),
            processing_time_ms: result.processing_time_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut entries = self.entries.write();
        entries.push(entry);
        if entries.len() > self.config.max_entries {
            let overflow = entries.len() - self.config.max_entries;
            entries.drain(0..overflow);
        }
    }

    pub fn get_entries(&self, trace_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect()
    }

    pub fn get_metrics(&self) -> AuditMetrics {
        let entries = self.entries.read();
        if entries.is_empty() {
            return AuditMetrics::default();
        }
        let total = entries.len();
        let allowed = entries.iter().filter(|e| e.allowed).count();
        let with_violations = entries.iter().filter(|e| e.violation_count > 0).count();
        let avg_time = entries.iter().map(|e| e.processing_time_ms).sum::<f64>() / total as f64;
        AuditMetrics {
            total_entries: total,
            allowed_rate: allowed as f64 / total as f64,
            violation_rate: with_violations as f64 / total as f64,
            avg_processing_time_ms: avg_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_reflect_recorded_entries() {
        let log = AuditLog::new(AuditLogConfig::default());
        log.record("t1", GuardrailLayer::InputSanitizer, &GuardrailResult::allow("t1"));
        log.record(
            "t1",
            GuardrailLayer::AgentEngine,
            &GuardrailResult::block(vec![], "t1"),
        );
        let metrics = log.get_metrics();
        assert_eq!(metrics.total_entries, 2);
        assert_eq!(metrics.allowed_rate, 0.5);
    }

    #[test]
    fn get_entries_filters_by_trace_id() {
        let log = AuditLog::new(AuditLogConfig::default());
        log.record("t1", GuardrailLayer::InputSanitizer, &GuardrailResult::allow("t1"));
        log.record("t2", GuardrailLayer::InputSanitizer, &GuardrailResult::allow("t2"));
        assert_eq!(log.get_entries("t1").len(), 1);
    }
}
