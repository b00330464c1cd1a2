use dashmap::DashMap;
use shared::{ChangeEvent, ServerToClient, Topic};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-process change feed. Connections register a sender, subscribe to
/// topics, and receive every event published on them. Delivery uses
/// `try_send`: a subscriber that cannot keep up is dropped rather than
/// buffered without bound.
pub struct EventHub {
    /// Process-wide event counter; clients order events by it.
    seq: AtomicU64,
    /// Map of connection ID -> sender to that websocket
    connections: DashMap<Uuid, mpsc::Sender<ServerToClient>>,
    /// Map of topic -> subscribed connection IDs
    topics: DashMap<Topic, HashSet<Uuid>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            connections: DashMap::new(),
            topics: DashMap::new(),
        }
    }

    pub fn register(&self, connection_id: Uuid, sender: mpsc::Sender<ServerToClient>) {
        self.connections.insert(connection_id, sender);
        tracing::debug!("subscriber connected: {}", connection_id);
    }

    /// Tears the connection down: every topic subscription goes with it.
    pub fn unregister(&self, connection_id: &Uuid) {
        self.connections.remove(connection_id);
        self.topics.retain(|_, subscribers| {
            subscribers.remove(connection_id);
            !subscribers.is_empty()
        });
        tracing::debug!("subscriber disconnected: {}", connection_id);
    }

    pub fn subscribe(&self, connection_id: Uuid, topic: Topic) {
        self.topics.entry(topic).or_default().insert(connection_id);
    }

    pub fn unsubscribe(&self, connection_id: &Uuid, topic: &Topic) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(connection_id);
        }
    }

    /// Assigns the next sequence number and fans the event out to every
    /// subscriber of the topic. Returns the assigned number.
    pub fn publish(&self, topic: Topic, event: ChangeEvent) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;

        let subscribers: Vec<Uuid> = match self.topics.get(&topic) {
            Some(set) => set.iter().copied().collect(),
            None => return seq,
        };

        let mut stale = Vec::new();
        for connection_id in subscribers {
            let Some(sender) = self.connections.get(&connection_id) else {
                stale.push(connection_id);
                continue;
            };
            let frame = ServerToClient::Event {
                seq,
                topic: topic.clone(),
                event: event.clone(),
            };
            if sender.try_send(frame).is_err() {
                tracing::warn!("dropping slow subscriber: {}", connection_id);
                stale.push(connection_id);
            }
        }

        for connection_id in stale {
            self.unregister(&connection_id);
        }
        seq
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(conversation_id: &str) -> ChangeEvent {
        ChangeEvent::ConversationUpdated {
            conversation_id: conversation_id.to_string(),
            updated_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_matching_topic() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(id, tx);
        hub.subscribe(id, Topic::Conversation("a".to_string()));

        hub.publish(Topic::Conversation("b".to_string()), sample_event("b"));
        hub.publish(Topic::Conversation("a".to_string()), sample_event("a"));

        let frame = rx.recv().await.unwrap();
        match frame {
            ServerToClient::Event { topic, .. } => {
                assert_eq!(topic, Topic::Conversation("a".to_string()))
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seq_strictly_increases_across_topics() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(id, tx);
        hub.subscribe(id, Topic::Conversation("a".to_string()));
        hub.subscribe(id, Topic::Meetings("u".to_string()));

        hub.publish(Topic::Conversation("a".to_string()), sample_event("a"));
        hub.publish(Topic::Meetings("u".to_string()), sample_event("a"));

        let mut last = 0;
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                ServerToClient::Event { seq, .. } => {
                    assert!(seq > last);
                    last = seq;
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        let topic = Topic::Room("r".to_string());
        hub.register(id, tx);
        hub.subscribe(id, topic.clone());
        hub.unsubscribe(&id, &topic);

        hub.publish(topic, sample_event("r"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_clears_all_subscriptions() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        let topic = Topic::Room("r".to_string());
        hub.register(id, tx);
        hub.subscribe(id, topic.clone());
        assert_eq!(hub.subscriber_count(&topic), 1);

        hub.unregister(&id);
        assert_eq!(hub.subscriber_count(&topic), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        let topic = Topic::Room("r".to_string());
        hub.register(id, tx);
        hub.subscribe(id, topic.clone());

        // Fill the buffer, then overflow it
        hub.publish(topic.clone(), sample_event("r"));
        hub.publish(topic.clone(), sample_event("r"));
        assert_eq!(hub.subscriber_count(&topic), 0);
    }
}
