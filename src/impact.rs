//! Impact Scorer (§4.7): hybrid rule-based / optional-ML / online-learning
//! risk assignment in [0, 1]. Generalizes the teacher's `deliberation.rs`
//! (`ImpactScorer`, `AdaptiveRouter`) and supplements it with the
//! online-learning cold-start hook and drift monitor implied by
//! `adaptive_governance/{impact_scorer,threshold_manager,online_learning,
//! drift_monitoring}.py` (none of which were retrieved verbatim in the pack;
//! the runtime contract — not the ML training — is what's in scope per §1).

use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use chrono::{Duration, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::BusConfig;
use crate::types::{AgentMessage, MessagePriority, MessageType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub semantic_weight: f32,
    pub permission_weight: f32,
    pub volume_weight: f32,
    pub context_weight: f32,
    pub drift_weight: f32,
    pub priority_weight: f32,
    pub type_weight: f32,
    pub critical_priority_boost: f32,
    pub high_semantic_boost: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.30,
            permission_weight: 0.20,
            volume_weight: 0.10,
            context_weight: 0.10,
            drift_weight: 0.15,
            priority_weight: 0.10,
            type_weight: 0.05,
            critical_priority_boost: 0.9,
            high_semantic_boost: 0.8,
        }
    }
}

/// Score → qualitative level mapping (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactLevel {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

pub fn impact_level(score: f32) -> ImpactLevel {
    if score >= 0.9 {
        ImpactLevel::Critical
    } else if score >= 0.7 {
        ImpactLevel::High
    } else if score >= 0.4 {
        ImpactLevel::Medium
    } else if score >= 0.2 {
        ImpactLevel::Low
    } else {
        ImpactLevel::Negligible
    }
}

/// Single feedback event used to nudge the online-learning correction layer.
#[derive(Debug, Clone)]
pub struct ImpactFeedback {
    pub agent_id: String,
    pub predicted: f32,
    pub actual: f32,
}

pub struct ImpactScorer {
    pub config: ScoringConfig,
    agent_request_rates: DashMap<String, Vec<chrono::DateTime<Utc>>>,
    agent_impact_history: DashMap<String, Vec<f32>>,
    high_impact_keywords: Vec<&'static str>,

    // Online-learning cold-start correction (§4.7).
    feedback_samples: DashMap<String, Vec<ImpactFeedback>>,
    sample_count: AtomicF32,
    min_samples_for_prediction: usize,
    cold_start_fallback: bool,

    // Drift monitor thresholds; concrete PSI computation against a
    // production model is out of scope (§1), the hook/gates are real.
    drift_psi_threshold: f32,
    drift_share_threshold: f32,
    min_samples_for_drift: usize,
}

impl ImpactScorer {
    pub fn new(config: Option<ScoringConfig>, bus_config: &BusConfig) -> Self {
        Self {
            config: config.unwrap_or_default(),
            agent_request_rates: DashMap::new(),
            agent_impact_history: DashMap::new(),
            high_impact_keywords: vec![
                "critical", "emergency", "security", "breach", "violation", "danger",
                "risk", "threat", "attack", "exploit", "vulnerability", "compromise",
                "governance", "policy", "regulation", "compliance", "legal", "audit",
                "financial", "transaction", "payment", "transfer", "blockchain", "consensus",
                "unauthorized", "abnormal", "suspicious", "alert",
            ],
            feedback_samples: DashMap::new(),
            sample_count: AtomicF32::new(0.0),
            min_samples_for_prediction: bus_config.min_samples_for_prediction,
            cold_start_fallback: bus_config.enable_cold_start_fallback,
            drift_psi_threshold: bus_config.drift_psi_threshold,
            drift_share_threshold: bus_config.drift_share_threshold,
            min_samples_for_drift: bus_config.min_samples_for_drift,
        }
    }

    pub fn calculate_impact_score(&self, message: &AgentMessage) -> f32 {
        let rule_based = self.rule_based_score(message);
        self.apply_online_correction(&message.from_agent, rule_based)
    }

    fn rule_based_score(&self, message: &AgentMessage) -> f32 {
        // The semantic/permission factors only read `message.content`, so
        // they're independent of the agent-keyed volume/context factors and
        // can run on separate rayon threads (same split as the teacher's
        // `validate_message_parallel`).
        let (semantic_score, permission_score) = rayon::join(
            || self.keyword_semantic_score(message),
            || self.calculate_permission_score(message),
        );
        let volume_score = self.calculate_volume_score(&message.from_agent);
        let context_score = self.calculate_context_score(message);
        let drift_score = self.calculate_drift_score(&message.from_agent, context_score);

        let priority_factor = match message.priority {
            MessagePriority::Critical => 1.0,
            MessagePriority::High => 0.7,
            MessagePriority::Normal => 0.3,
            MessagePriority::Low => 0.1,
        };

        let type_factor = match message.message_type {
            MessageType::GovernanceRequest | MessageType::ConstitutionalValidation => 0.8,
            MessageType::TaskRequest => 0.5,
            _ => 0.2,
        };

        let mut score = semantic_score * self.config.semantic_weight
            + permission_score * self.config.permission_weight
            + volume_score * self.config.volume_weight
            + context_score * self.config.context_weight
            + drift_score * self.config.drift_weight
            + priority_factor * self.config.priority_weight
            + type_factor * self.config.type_weight;

        let total_weight = self.config.semantic_weight
            + self.config.permission_weight
            + self.config.volume_weight
            + self.config.context_weight
            + self.config.drift_weight
            + self.config.priority_weight
            + self.config.type_weight;

        if total_weight > 0.0 {
            score /= total_weight;
        }

        if priority_factor >= 1.0 {
            score = score.max(self.config.critical_priority_boost);
        }
        if semantic_score > 0.8 {
            score = score.max(self.config.high_semantic_boost);
        }

        score.clamp(0.0, 1.0)
    }

    fn keyword_semantic_score(&self, message: &AgentMessage) -> f32 {
        let mut hits = 0;
        for value in message.content.values() {
            let lower_val = value.to_lowercase();
            for kw in &self.high_impact_keywords {
                if lower_val.contains(kw) {
                    hits += 1;
                }
            }
        }
        (hits as f32 * 0.3).min(0.9)
    }

    fn calculate_permission_score(&self, message: &AgentMessage) -> f32 {
        let high_risk_tools = ["admin", "delete", "transfer", "execute", "blockchain", "payment"];
        let mut max_risk: f32 = 0.1;
        for value in message.content.values() {
            let lower_val = value.to_lowercase();
            if high_risk_tools.iter().any(|&tool| lower_val.contains(tool)) {
                max_risk = 0.9;
                break;
            }
        }
        max_risk
    }

    fn calculate_volume_score(&self, agent_id: &str) -> f32 {
        let now = Utc::now();
        let window = Duration::seconds(60);

        let mut rates = self.agent_request_rates.entry(agent_id.to_string()).or_default();
        rates.push(now);
        rates.retain(|&t| now - t < window);

        let count = rates.len();
        if count < 10 {
            0.1
        } else if count < 50 {
            0.4
        } else if count < 100 {
            0.7
        } else {
            1.0
        }
    }

    fn calculate_context_score(&self, message: &AgentMessage) -> f32 {
        let now = Utc::now();
        let mut score: f32 = 0.2;

        if (1..=5).contains(&now.hour()) {
            score += 0.3;
        }

        if let Some(amount_str) = message.payload.get("amount") {
            if let Ok(amount) = amount_str.parse::<f64>() {
                if amount > 10000.0 {
                    score += 0.4;
                }
            }
        }

        score.min(1.0)
    }

    fn calculate_drift_score(&self, agent_id: &str, current_impact: f32) -> f32 {
        let mut history = self.agent_impact_history.entry(agent_id.to_string()).or_default();

        if history.is_empty() {
            history.push(current_impact);
            return 0.0;
        }

        let mean: f32 = history.iter().sum::<f32>() / history.len() as f32;
        let deviation = (current_impact - mean).abs();

        history.push(current_impact);
        if history.len() > 20 {
            history.remove(0);
        }

        if deviation > 0.3 {
            (deviation / 0.3 * 0.5).min(1.0)
        } else {
            0.0
        }
    }

    /// Online-learning correction. Below `min_samples_for_prediction` this is
    /// a pure cold-start pass-through to the rule-based score; above it, the
    /// rule-based score is nudged by the mean signed feedback error observed
    /// for the sending agent, bounded so it can never flip a low-risk message
    /// into deliberation on correction alone.
    fn apply_online_correction(&self, agent_id: &str, rule_based: f32) -> f32 {
        // `ENABLE_COLD_START_FALLBACK=false` disables the online-learning
        // correction layer outright, so the rule-based score is always
        // authoritative regardless of how much feedback has accumulated.
        if !self.cold_start_fallback {
            return rule_based;
        }

        let samples = self.feedback_samples.get(agent_id);
        let n = samples.as_ref().map(|s| s.len()).unwrap_or(0);

        if n < self.min_samples_for_prediction {
            return rule_based;
        }

        let samples = samples.unwrap();
        let mean_error: f32 =
            samples.iter().map(|f| f.actual - f.predicted).sum::<f32>() / samples.len() as f32;
        (rule_based + mean_error.clamp(-0.1, 0.1)).clamp(0.0, 1.0)
    }

    pub fn record_feedback(&self, feedback: ImpactFeedback) {
        self.sample_count.fetch_add(1.0, Ordering::Relaxed);
        let mut samples = self.feedback_samples.entry(feedback.agent_id.clone()).or_default();
        samples.push(feedback);
        if samples.len() > 200 {
            samples.remove(0);
        }
    }

    /// Population-stability-index-style drift check against a synthetic
    /// baseline distribution. Returns `true` if the agent's recent impact
    /// distribution has drifted beyond the configured thresholds, gated by a
    /// minimum-sample count to avoid false alarms on sparse history.
    pub fn has_drifted(&self, agent_id: &str) -> bool {
        let history = match self.agent_impact_history.get(agent_id) {
            Some(h) => h,
            None => return false,
        };
        if history.len() < self.min_samples_for_drift {
            return false;
        }

        let mean: f32 = history.iter().sum::<f32>() / history.len() as f32;
        let variance: f32 =
            history.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / history.len() as f32;
        let psi_proxy = variance.sqrt();

        psi_proxy > self.drift_psi_threshold || (mean - 0.5).abs() > self.drift_share_threshold
    }
}

/// Adaptive threshold manager (§4.7): nudges the deliberation boundary from
/// observed false-positive/false-negative rates, bounded to [0.1, 0.95].
pub struct AdaptiveThresholdManager {
    pub threshold: AtomicF32,
}

impl AdaptiveThresholdManager {
    pub fn new(initial: f32) -> Self {
        Self {
            threshold: AtomicF32::new(initial),
        }
    }

    pub fn current(&self) -> f32 {
        self.threshold.load(Ordering::Relaxed)
    }

    pub fn update(&self, fp_rate: f32, fn_rate: f32) {
        let adjustment = if fp_rate > 0.3 {
            0.05
        } else if fn_rate > 0.1 {
            -0.05
        } else {
            0.0
        };

        if adjustment != 0.0 {
            let current = self.threshold.load(Ordering::Relaxed);
            self.threshold
                .store((current + adjustment).clamp(0.1, 0.95), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ImpactScorer {
        ImpactScorer::new(None, &BusConfig::default())
    }

    #[test]
    fn critical_priority_boosts_score() {
        let scorer = scorer();
        let mut msg = AgentMessage::new("agent-1", "agent-2", "t1");
        msg.priority = MessagePriority::Critical;
        let score = scorer.calculate_impact_score(&msg);
        assert!(score >= 0.9, "expected critical boost, got {score}");
    }

    #[test]
    fn level_thresholds_match_spec() {
        assert_eq!(impact_level(0.95), ImpactLevel::Critical);
        assert_eq!(impact_level(0.75), ImpactLevel::High);
        assert_eq!(impact_level(0.5), ImpactLevel::Medium);
        assert_eq!(impact_level(0.25), ImpactLevel::Low);
        assert_eq!(impact_level(0.05), ImpactLevel::Negligible);
    }

    #[test]
    fn cold_start_is_pass_through() {
        let scorer = scorer();
        let msg = AgentMessage::new("agent-1", "agent-2", "t1");
        let rule = scorer.rule_based_score(&msg);
        let corrected = scorer.apply_online_correction("agent-1", rule);
        assert_eq!(rule, corrected);
    }

    #[test]
    fn threshold_manager_clamps() {
        let mgr = AdaptiveThresholdManager::new(0.1);
        for _ in 0..10 {
            mgr.update(0.0, 0.5);
        }
        assert!(mgr.current() >= 0.1);
    }
}
