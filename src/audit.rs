//! Fire-and-forget audit client (§4.11). Background task drains an mpsc
//! channel and POSTs to the ledger; failures are logged and swallowed, with a
//! deterministic simulated hash returned so callers keep a correlation id
//! even when the ledger is unreachable — generalizes `shared/audit_client.py`'s
//! literal `"simulated_audit_hash"` placeholder into a hash of the entry so
//! distinct failed entries stay distinguishable.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::DecisionLog;

#[derive(Clone)]
pub struct AuditClient {
    pub service_url: String,
    tx: mpsc::Sender<DecisionLog>,
}

impl AuditClient {
    pub fn new(service_url: impl Into<String>, timeout: Duration) -> Self {
        let service_url = service_url.into();
        let (tx, mut rx) = mpsc::channel::<DecisionLog>(1000);
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        let url = format!("{}/record", service_url.trim_end_matches('/'));

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                match client.post(&url).json(&entry).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(trace_id = %entry.trace_id, "audit entry recorded");
                    }
                    Ok(resp) => {
                        warn!(status = %resp.status(), trace_id = %entry.trace_id, "audit service returned error status");
                    }
                    Err(e) => {
                        warn!(error = %e, trace_id = %entry.trace_id, "failed to reach audit service");
                    }
                }
            }
        });

        Self { service_url, tx }
    }

    /// Non-blocking submit; never affects the caller's serving path.
    pub async fn report(&self, entry: DecisionLog) -> String {
        let hash = simulated_entry_hash(&entry);
        let _ = self.tx.try_send(entry);
        hash
    }
}

fn simulated_entry_hash(entry: &DecisionLog) -> String {
    let mut hasher = DefaultHasher::new();
    entry.trace_id.hash(&mut hasher);
    entry.agent_id.hash(&mut hasher);
    entry.timestamp.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentMessage, ValidationResult};

    #[tokio::test]
    async fn report_returns_correlation_hash_without_blocking() {
        let client = AuditClient::new("http://127.0.0.1:0", Duration::from_millis(50));
        let msg = AgentMessage::new("a", "b", "t1");
        let result = ValidationResult::new();
        let entry = DecisionLog::build(&msg, &result, "span-1");
        let hash = client.report(entry).await;
        assert_eq!(hash.len(), 16);
    }
}
