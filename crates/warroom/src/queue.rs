//! Outbound queue for events that could not be delivered yet.
//!
//! FIFO. Queue order is producer call order; the envelope timestamps may
//! disagree with it because they are assigned at dispatch.

use std::collections::VecDeque;

use warroom_protocol::Envelope;

/// Ordered buffer of undelivered events with an optional capacity.
///
/// When full, the oldest event is evicted to make room.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    events: VecDeque<Envelope>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Append an event at the tail. Returns the evicted event, if any.
    pub fn enqueue(&mut self, envelope: Envelope) -> Option<Envelope> {
        self.events.push_back(envelope);
        self.evict_overflow().pop()
    }

    /// Put events back at the head, keeping their relative order.
    /// Returns how many events were evicted to stay within capacity.
    pub fn requeue_front(&mut self, envelopes: Vec<Envelope>) -> usize {
        for envelope in envelopes.into_iter().rev() {
            self.events.push_front(envelope);
        }
        self.evict_overflow().len()
    }

    /// Remove and return every queued event in FIFO order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.events.iter()
    }

    fn evict_overflow(&mut self) -> Vec<Envelope> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };
        let excess = self.events.len().saturating_sub(capacity);
        self.events.drain(..excess).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warroom_protocol::EventPayload;

    fn message(n: usize) -> Envelope {
        Envelope::new(
            EventPayload::TimelineMessage {
                actor: "alice".into(),
                content: format!("msg-{n}"),
            },
            "room",
            "alice",
            n as i64,
        )
    }

    fn contents(envelopes: &[Envelope]) -> Vec<String> {
        envelopes
            .iter()
            .map(|e| match &e.payload {
                EventPayload::TimelineMessage { content, .. } => content.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let mut queue = OutboundQueue::new(None);
        for n in 0..5 {
            assert!(queue.enqueue(message(n)).is_none());
        }

        let drained = queue.drain();
        assert_eq!(
            contents(&drained),
            vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]
        );
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut queue = OutboundQueue::new(Some(2));
        queue.enqueue(message(0));
        queue.enqueue(message(1));
        let evicted = queue.enqueue(message(2)).unwrap();

        assert_eq!(contents(&[evicted]), vec!["msg-0"]);
        assert_eq!(contents(&queue.drain()), vec!["msg-1", "msg-2"]);
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let mut queue = OutboundQueue::new(None);
        queue.enqueue(message(3));
        let evicted = queue.requeue_front(vec![message(1), message(2)]);

        assert_eq!(evicted, 0);
        assert_eq!(contents(&queue.drain()), vec!["msg-1", "msg-2", "msg-3"]);
    }
}
