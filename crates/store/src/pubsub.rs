//! Pub/sub channels over the store's key namespace.
//!
//! Each channel is a lazily-created `broadcast::Sender` keyed by the same
//! key strings the adapter uses (`task:{id}` for conversation updates,
//! `throttle:{model_id}` for throttle-state convergence). Publishing when no
//! subscriber is listening is a no-op, matching `broadcast`'s own semantics.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

pub struct PubSub<T: Clone + Send + 'static> {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> PubSub<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender_for(&self, key: &str) -> broadcast::Sender<T> {
        {
            let channels = self.channels.read();
            if let Some(tx) = channels.get(key) {
                return tx.clone();
            }
        }
        let mut channels = self.channels.write();
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a message on `key`. Returns the number of active receivers,
    /// or 0 if none were subscribed.
    pub fn publish(&self, key: &str, message: T) -> usize {
        self.sender_for(key).send(message).unwrap_or(0)
    }

    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<T> {
        self.sender_for(key).subscribe()
    }
}

impl<T: Clone + Send + 'static> Default for PubSub<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub type Arced<T> = Arc<PubSub<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscriber_returns_zero() {
        let pubsub: PubSub<u32> = PubSub::default();
        let delivered = pubsub.publish("throttle:model-a", 1);
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let pubsub: PubSub<u32> = PubSub::default();
        let mut rx = pubsub.subscribe("throttle:model-a");
        pubsub.publish("throttle:model-a", 42);
        assert_eq!(rx.recv().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn channels_are_isolated_by_key() {
        let pubsub: PubSub<u32> = PubSub::default();
        let mut rx_a = pubsub.subscribe("throttle:model-a");
        let _rx_b = pubsub.subscribe("throttle:model-b");
        pubsub.publish("throttle:model-a", 7);
        assert_eq!(rx_a.recv().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn multiple_subscribers_on_same_key_all_receive() {
        let pubsub: PubSub<u32> = PubSub::default();
        let mut rx1 = pubsub.subscribe("task:t1");
        let mut rx2 = pubsub.subscribe("task:t1");
        let delivered = pubsub.publish("task:t1", 9);
        assert_eq!(delivered, 2);
        assert_eq!(rx1.recv().await.unwrap(), 9);
        assert_eq!(rx2.recv().await.unwrap(), 9);
    }
}
