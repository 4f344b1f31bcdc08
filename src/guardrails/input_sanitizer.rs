//! Layer 2: Input Sanitizer — length/content-type checks, HTML scrubbing,
//! injection-pattern detection and PII detection. Ported from
//! `runtime_safety_guardrails.py`'s `InputSanitizer` (`_compile_pii_patterns`,
//! `_compile_injection_patterns`, `_sanitize_html`, `_detect_injection`,
//! `_detect_pii`, `_apply_sanitization`).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::enums::{GuardrailLayer, SafetyAction, ViolationSeverity};
use super::models::{GuardrailResult, Violation};

#[derive(Debug, Clone)]
pub struct InputSanitizerConfig {
    pub enabled: bool,
    pub max_content_length: usize,
    pub allowed_content_types: Vec<String>,
}

impl Default for InputSanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_content_length: 100_000,
            allowed_content_types: vec!["text/plain".into(), "application/json".into()],
        }
    }
}

/// PII patterns: SSN, card PAN, email, phone, IP, MAC, bank routing,
/// driver's license, passport, tax id, health insurance id, API key/token,
/// crypto address, credential URL.
static PII_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("ssn", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            "credit_card",
            Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap(),
        ),
        (
            "email",
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
        ),
        (
            "phone",
            Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap(),
        ),
        (
            "ipv4",
            Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap(),
        ),
        (
            "mac_address",
            Regex::new(r"\b(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}\b").unwrap(),
        ),
        (
            "bank_routing",
            Regex::new(r"\b\d{9}\b").unwrap(),
        ),
        (
            "drivers_license",
            Regex::new(r"\b[A-Z]{1,2}\d{6,8}\b").unwrap(),
        ),
        (
            "passport",
            Regex::new(r"\b[A-Z]{1,2}\d{7,9}\b").unwrap(),
        ),
        (
            "tax_id",
            Regex::new(r"\b\d{2}-\d{7}\b").unwrap(),
        ),
        (
            "health_insurance_id",
            Regex::new(r"\b[A-Z]{3}\d{9}\b").unwrap(),
        ),
        (
            "api_key",
            Regex::new(r#"(?i)\b(?:api[_-]?key|token|secret)\s*[:=]\s*['"]?[A-Za-z0-9_\-]{16,}['"]?"#).unwrap(),
        ),
        (
            "crypto_address",
            Regex::new(r"\b(?:bc1|[13])[a-zA-HJ-NP-Z0-9]{25,39}\b").unwrap(),
        ),
        (
            "credential_url",
            Regex::new(r"[a-zA-Z][a-zA-Z0-9+.-]*://[^\s/:@]+:[^\s/:@]+@").unwrap(),
        ),
    ]
});

/// Injection patterns spanning XSS, SQLi, command, NoSQL, LDAP, template,
/// path-traversal and XXE categories.
static INJECTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "xss_script_tag",
            Regex::new(r"(?i)<script[^>]*>.*?</script>").unwrap(),
        ),
        (
            "xss_event_handler",
            Regex::new(r#"(?i)on\w+\s*=\s*['"][^'"]*['"]"#).unwrap(),
        ),
        (
            "xss_javascript_uri",
            Regex::new(r"(?i)javascript\s*:").unwrap(),
        ),
        (
            "sqli_union",
            Regex::new(r"(?i)\bunion\b.{0,40}\bselect\b").unwrap(),
        ),
        (
            "sqli_tautology",
            Regex::new(r"(?i)\bor\b\s+\d+\s*=\s*\d+").unwrap(),
        ),
        (
            "sqli_comment",
            Regex::new(r"(--|#|/\*)").unwrap(),
        ),
        (
            "command_injection",
            Regex::new(r"[;&|`]\s*(rm|cat|wget|curl|nc|bash|sh)\b").unwrap(),
        ),
        (
            "nosql_operator",
            Regex::new(r#"\$(where|ne|gt|lt|regex)\s*:"#).unwrap(),
        ),
        (
            "ldap_injection",
            Regex::new(r"[()&|!*]{2,}").unwrap(),
        ),
        (
            "template_injection",
            Regex::new(r"\{\{.*?\}\}|\$\{.*?\}").unwrap(),
        ),
        (
            "path_traversal",
            Regex::new(r"\.\./|\.\.\\").unwrap(),
        ),
        (
            "xxe_entity",
            Regex::new(r"(?i)<!entity").unwrap(),
        ),
    ]
});

pub struct InputSanitizer {
    pub config: InputSanitizerConfig,
}

impl InputSanitizer {
    pub fn new(config: InputSanitizerConfig) -> Self {
        Self { config }
    }

    pub fn layer(&self) -> GuardrailLayer {
        GuardrailLayer::InputSanitizer
    }

    pub fn process(&self, content: &str, context: &HashMap<String, String>) -> GuardrailResult {
        let trace_id = context.get("trace_id").cloned().unwrap_or_default();

        if content.len() > self.config.max_content_length {
            return GuardrailResult::block(
                vec![Violation::new(
                    self.layer(),
                    "content_too_long",
                    ViolationSeverity::Medium,
                    format!("Content exceeds {} bytes", self.config.max_content_length),
                    &trace_id,
                )],
                trace_id,
            );
        }

        if let Some(content_type) = context.get("content_type") {
            if !self.config.allowed_content_types.iter().any(|t| t == content_type) {
                return GuardrailResult::block(
                    vec![Violation::new(
                        self.layer(),
                        "disallowed_content_type",
                        ViolationSeverity::Low,
                        format!("Content-type {content_type} is not allowed"),
                        &trace_id,
                    )],
                    trace_id,
                );
            }
        }

        let mut violations = Vec::new();
        for (name, pattern) in INJECTION_PATTERNS.iter() {
            if pattern.is_match(content) {
                violations.push(
                    Violation::new(
                        self.layer(),
                        "injection_detected",
                        ViolationSeverity::Critical,
                        format!("Detected possible {name} payload"),
                        &trace_id,
                    )
                    .with_detail("pattern", *name),
                );
            }
        }

        if violations.iter().any(|v| v.violation_type == "injection_detected") {
            let mut result = GuardrailResult::block(violations, trace_id);
            result.action = SafetyAction::Block;
            return result;
        }

        // PII on the input path never blocks and is never rewritten here —
        // it only flags (AUDIT). Redaction is an output-path concern
        // (`OutputVerifier`); rewriting inbound content a sender submitted
        // would silently corrupt what handlers see it as.
        let pii_hits = Self::detect_pii(content);
        for kind in &pii_hits {
            violations.push(Violation::new(
                self.layer(),
                "pii_detected",
                ViolationSeverity::Medium,
                format!("Detected possible {kind}"),
                &trace_id,
            ));
        }

        let sanitized = Self::sanitize_html(content);
        let html_modified = (sanitized != content).then_some(sanitized);

        let mut result = GuardrailResult::allow(trace_id);
        if html_modified.is_some() {
            result.action = SafetyAction::Modify;
            result.modified_data = html_modified;
        } else if !pii_hits.is_empty() {
            result.action = SafetyAction::Audit;
        }
        result.violations = violations;
        result
    }

    /// Strips `script`/`iframe`/`object`/`embed` elements entirely rather
    /// than entity-encoding the whole payload, matching the allow-by-default
    /// posture of the rest of the pipeline.
    fn sanitize_html(content: &str) -> String {
        static DANGEROUS_TAG: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?is)<(script|iframe|object|embed)\b[^>]*>.*?</\1\s*>|<(script|iframe|object|embed)\b[^>]*/?>")
                .unwrap()
        });
        DANGEROUS_TAG.replace_all(content, "").into_owned()
    }

    fn detect_pii(content: &str) -> Vec<&'static str> {
        PII_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(name, _)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_on_script_injection() {
        let sanitizer = InputSanitizer::new(InputSanitizerConfig::default());
        let result = sanitizer.process("<script>alert(1)</script>", &HashMap::new());
        assert!(!result.allowed);
    }

    #[test]
    fn flags_email_pii_without_rewriting_content() {
        let sanitizer = InputSanitizer::new(InputSanitizerConfig::default());
        let result = sanitizer.process("contact me at a@b.com", &HashMap::new());
        assert!(result.allowed);
        assert_eq!(result.action, SafetyAction::Audit);
        assert!(result.modified_data.is_none());
        assert!(result.violations.iter().any(|v| v.violation_type == "pii_detected"));
    }

    #[test]
    fn clean_content_passes_unmodified() {
        let sanitizer = InputSanitizer::new(InputSanitizerConfig::default());
        let result = sanitizer.process("please summarize the report", &HashMap::new());
        assert!(result.allowed);
        assert_eq!(result.action, SafetyAction::Allow);
        assert!(result.modified_data.is_none());
    }
}
