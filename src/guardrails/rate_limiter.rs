//! Layer 1: Rate Limiter — OWASP DoS protection via sliding-window + burst
//! limit per client key. Ported from `runtime_safety_guardrails.py`'s
//! `RateLimiter`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::enums::{GuardrailLayer, ViolationSeverity};
use super::models::{GuardrailResult, Violation};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub requests_per_minute: usize,
    pub burst_limit: usize,
    pub window: Duration,
    pub block_duration: Duration,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            burst_limit: 10,
            window: Duration::from_secs(60),
            block_duration: Duration::from_secs(300),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

pub struct RateLimiter {
    pub config: RateLimiterConfig,
    request_times: Mutex<HashMap<String, Vec<Instant>>>,
    blocked_until: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            request_times: Mutex::new(HashMap::new()),
            blocked_until: Mutex::new(HashMap::new()),
        }
    }

    pub fn layer(&self) -> GuardrailLayer {
        GuardrailLayer::RateLimiter
    }

    /// Priority order for client identification: API key > user > IP > session.
    pub fn extract_client_id(context: &HashMap<String, String>) -> String {
        context
            .get("api_key")
            .or_else(|| context.get("user_id"))
            .or_else(|| context.get("ip_address"))
            .or_else(|| context.get("session_id"))
            .cloned()
            .unwrap_or_else(|| "anonymous".to_string())
    }

    pub fn process(&self, context: &HashMap<String, String>) -> GuardrailResult {
        let start = Instant::now();
        let trace_id = context.get("trace_id").cloned().unwrap_or_default();
        let client_id = Self::extract_client_id(context);

        if self.config.blacklist.contains(&client_id) {
            return GuardrailResult::block(
                vec![Violation::new(
                    self.layer(),
                    "blacklisted_client",
                    ViolationSeverity::Critical,
                    format!("Client {client_id} is blacklisted"),
                    &trace_id,
                )],
                trace_id,
            );
        }

        if self.config.whitelist.contains(&client_id) {
            let mut r = GuardrailResult::allow(trace_id);
            r.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
            return r;
        }

        let now = Instant::now();
        {
            let mut blocked = self.blocked_until.lock();
            if let Some(&until) = blocked.get(&client_id) {
                if now < until {
                    return GuardrailResult::block(
                        vec![Violation::new(
                            self.layer(),
                            "rate_limit_blocked",
                            ViolationSeverity::High,
                            format!("Client {client_id} is rate limited"),
                            &trace_id,
                        )],
                        trace_id,
                    );
                }
                blocked.remove(&client_id);
            }
        }

        if self.is_rate_limited(&client_id, now) {
            self.blocked_until
                .lock()
                .insert(client_id.clone(), now + self.config.block_duration);
            return GuardrailResult::block(
                vec![Violation::new(
                    self.layer(),
                    "rate_limit_exceeded",
                    ViolationSeverity::Medium,
                    format!("Rate limit exceeded for client {client_id}"),
                    &trace_id,
                )],
                trace_id,
            );
        }

        let mut r = GuardrailResult::allow(trace_id);
        r.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        r
    }

    fn is_rate_limited(&self, client_id: &str, now: Instant) -> bool {
        let mut times = self.request_times.lock();
        let entry = times.entry(client_id.to_string()).or_default();

        let window_start = now - self.config.window;
        entry.retain(|&t| t > window_start);

        let burst_start = now - Duration::from_secs(1);
        let recent = entry.iter().filter(|&&t| t > burst_start).count();
        if recent >= self.config.burst_limit {
            return true;
        }

        if entry.len() >= self.config.requests_per_minute {
            return true;
        }

        entry.push(now);

        if entry.len() > self.config.requests_per_minute * 2 {
            let cutoff = now - self.config.window * 2;
            entry.retain(|&t| t > cutoff);
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklisted_client_is_blocked() {
        let config = RateLimiterConfig {
            blacklist: vec!["bad-actor".to_string()],
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);
        let mut ctx = HashMap::new();
        ctx.insert("api_key".to_string(), "bad-actor".to_string());
        let result = limiter.process(&ctx);
        assert!(!result.allowed);
    }

    #[test]
    fn burst_limit_blocks_rapid_requests() {
        let config = RateLimiterConfig {
            burst_limit: 3,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);
        let mut ctx = HashMap::new();
        ctx.insert("user_id".to_string(), "u1".to_string());
        for _ in 0..3 {
            assert!(limiter.process(&ctx).allowed);
        }
        assert!(!limiter.process(&ctx).allowed);
    }
}
