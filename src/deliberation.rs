//! Deliberation Divert (§4.8): messages with `impact_score >= threshold` are
//! not delivered; they are enqueued for a separate human/committee
//! approval-chain engine (external, out of scope) and the result status
//! becomes `PENDING_DELIBERATION`.

use parking_lot::Mutex;

use crate::types::AgentMessage;

#[derive(Debug, Clone)]
pub struct DeliberationEntry {
    pub message: AgentMessage,
    pub impact_score: f32,
    pub enqueued_at: String,
}

/// FIFO queue the external approval-chain engine polls. Locking discipline:
/// the mutex is only ever held for the duration of a Vec push/pop, never
/// across an `.await` point (§5).
pub struct DeliberationQueue {
    entries: Mutex<Vec<DeliberationEntry>>,
}

impl Default for DeliberationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliberationQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue(&self, message: AgentMessage, impact_score: f32) {
        let entry = DeliberationEntry {
            message,
            impact_score,
            enqueued_at: chrono::Utc::now().to_rfc3339(),
        };
        self.entries.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains and returns the whole queue; used by the external approval
    /// engine to poll for pending items.
    pub fn drain(&self) -> Vec<DeliberationEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn peek(&self) -> Vec<DeliberationEntry> {
        self.entries.lock().clone()
    }
}

/// Whether a message's impact score requires deliberation instead of normal
/// delivery (spec §4.8's `>= 0.8` boundary, parameterised so the adaptive
/// threshold manager can move it).
pub fn requires_deliberation(impact_score: f32, threshold: f32) -> bool {
    impact_score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_increments_length() {
        let queue = DeliberationQueue::new();
        assert!(queue.is_empty());
        queue.enqueue(AgentMessage::new("a", "b", "t1"), 0.95);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn boundary_is_inclusive() {
        assert!(requires_deliberation(0.8, 0.8));
        assert!(!requires_deliberation(0.79, 0.8));
    }
}
