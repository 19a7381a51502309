use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::DeadLetter;

/// Destination for events whose delivery was given up on.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: DeadLetter);
    async fn snapshot(&self) -> Vec<DeadLetter>;
}

/// Bounded in-memory dead-letter buffer.
///
/// Oldest entries are evicted once `capacity` is exceeded. Contents do not
/// survive a restart.
pub struct InMemoryDeadLetters {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl InMemoryDeadLetters {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn record(&self, letter: DeadLetter) {
        let mut guard = self.entries.lock().await;
        guard.push_back(letter);
        while guard.len() > self.capacity {
            guard.pop_front();
        }
    }

    async fn snapshot(&self) -> Vec<DeadLetter> {
        let guard = self.entries.lock().await;
        guard.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform;
    use crate::types::InboundEvent;

    fn letter(message_id: &str) -> DeadLetter {
        let event = transform(InboundEvent {
            message_id: message_id.into(),
            ..Default::default()
        });
        DeadLetter {
            event,
            error: "collector responded with status 500".into(),
            status: Some(500),
            attempts: 1,
            failed_at_secs: 0,
        }
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let sink = InMemoryDeadLetters::new(2);
        sink.record(letter("a")).await;
        sink.record(letter("b")).await;
        sink.record(letter("c")).await;

        let ids: Vec<_> = sink
            .snapshot()
            .await
            .into_iter()
            .map(|l| l.event.message_id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test]
    async fn zero_capacity_keeps_nothing() {
        let sink = InMemoryDeadLetters::new(0);
        sink.record(letter("a")).await;
        assert!(sink.is_empty().await);
    }
}
