//! Layer 5: Output Verifier — outgoing content-safety/toxicity checks and
//! PII redaction. Ported from `runtime_safety_guardrails.py`'s
//! `OutputVerifier` (`_check_content_safety`, `_check_toxicity`,
//! `_redact_pii`).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::enums::{GuardrailLayer, SafetyAction, ViolationSeverity};
use super::models::{GuardrailResult, Violation};

#[derive(Debug, Clone)]
pub struct OutputVerifierConfig {
    pub enabled: bool,
    pub block_on_harmful_content: bool,
    pub redact_pii: bool,
    pub toxicity_threshold: f32,
}

impl Default for OutputVerifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_on_harmful_content: true,
            redact_pii: true,
            toxicity_threshold: 0.7,
        }
    }
}

static HARMFUL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "weapon_synthesis",
            Regex::new(r"(?i)how to (?:build|make|synthesize) (?:a )?(?:bomb|explosive|weapon)").unwrap(),
        ),
        (
            "malware_authoring",
            Regex::new(r"(?i)(?:write|generate) (?:a )?(?:ransomware|keylogger|virus)").unwrap(),
        ),
        (
            "self_harm",
            Regex::new(r"(?i)(?:how to|ways to) (?:kill|harm) (?:myself|yourself)").unwrap(),
        ),
    ]
});

static TOXIC_TERMS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec!["idiot", "stupid", "hate you", "kill yourself"]
});

pub struct OutputVerifier {
    pub config: OutputVerifierConfig,
}

impl OutputVerifier {
    pub fn new(config: OutputVerifierConfig) -> Self {
        Self { config }
    }

    pub fn layer(&self) -> GuardrailLayer {
        GuardrailLayer::OutputVerifier
    }

    pub fn process(&self, content: &str, context: &HashMap<String, String>) -> GuardrailResult {
        let trace_id = context.get("trace_id").cloned().unwrap_or_default();
        let mut violations = Vec::new();

        for (name, pattern) in HARMFUL_PATTERNS.iter() {
            if pattern.is_match(content) {
                violations.push(
                    Violation::new(
                        self.layer(),
                        "harmful_content",
                        ViolationSeverity::Critical,
                        format!("Output matched harmful pattern {name}"),
                        &trace_id,
                    )
                    .with_detail("pattern", *name),
                );
            }
        }

        if !violations.is_empty() && self.config.block_on_harmful_content {
            return GuardrailResult::block(violations, trace_id);
        }

        let toxicity = Self::toxicity_score(content);
        if toxicity >= self.config.toxicity_threshold {
            violations.push(
                Violation::new(
                    self.layer(),
                    "toxic_content",
                    ViolationSeverity::Medium,
                    format!("Toxicity score {toxicity:.2} exceeds threshold"),
                    &trace_id,
                )
                .with_detail("toxicity_score", toxicity.to_string()),
            );
        }

        let (redacted, pii_found) = if self.config.redact_pii {
            Self::redact_pii(content)
        } else {
            (content.to_string(), false)
        };

        let mut result = GuardrailResult::allow(trace_id);
        result.violations = violations;
        if pii_found {
            result.action = SafetyAction::Modify;
            result.modified_data = Some(redacted);
        }
        result
    }

    fn toxicity_score(content: &str) -> f32 {
        let lower = content.to_lowercase();
        let hits = TOXIC_TERMS.iter().filter(|t| lower.contains(*t)).count();
        (hits as f32 * 0.4).min(1.0)
    }

    fn redact_pii(content: &str) -> (String, bool) {
        static EMAIL: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
        static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

        let mut found = false;
        let mut redacted = content.to_string();
        if EMAIL.is_match(&redacted) {
            found = true;
            redacted = EMAIL.replace_all(&redacted, "[REDACTED:email]").into_owned();
        }
        if SSN.is_match(&redacted) {
            found = true;
            redacted = SSN.replace_all(&redacted, "[REDACTED:ssn]").into_owned();
        }
        (redacted, found)
    }
}
