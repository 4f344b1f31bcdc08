//! Feedback loop (§4.7 supplement): `FeedbackEvent`/`FeedbackSink` trait.
//! Persistence and MLflow tracking are out of scope (§1); this module wires
//! the runtime hook the impact scorer's online-learning correction needs.

use async_trait::async_trait;

use crate::impact::{ImpactFeedback, ImpactScorer};

#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    pub agent_id: String,
    pub message_id: String,
    pub predicted_score: f32,
    pub actual_outcome: f32,
}

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn submit(&self, event: FeedbackEvent);
}

/// Feeds corrections straight back into the live `ImpactScorer` — the only
/// consumer the runtime contract requires; durable storage of the event
/// stream is a deployment concern out of scope here.
pub struct ScorerFeedbackSink<'a> {
    scorer: &'a ImpactScorer,
}

impl<'a> ScorerFeedbackSink<'a> {
    pub fn new(scorer: &'a ImpactScorer) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl<'a> FeedbackSink for ScorerFeedbackSink<'a> {
    async fn submit(&self, event: FeedbackEvent) {
        self.scorer.record_feedback(ImpactFeedback {
            agent_id: event.agent_id,
            predicted: event.predicted_score,
            actual: event.actual_outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;

    #[tokio::test]
    async fn submit_forwards_to_scorer() {
        let scorer = ImpactScorer::new(None, &BusConfig::default());
        let sink = ScorerFeedbackSink::new(&scorer);
        sink.submit(FeedbackEvent {
            agent_id: "a1".to_string(),
            message_id: "m1".to_string(),
            predicted_score: 0.5,
            actual_outcome: 0.7,
        })
        .await;
    }
}
