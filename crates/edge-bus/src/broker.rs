//! # In-Memory Broker
//!
//! Single-process implementation of the bus.
//!
//! Uses `tokio::sync::broadcast` for multi-producer, multi-consumer
//! semantics. Suitable for single-node operation and tests; deployments
//! spanning hosts would put an MQTT or similar client behind the
//! [`Transport`] trait instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::subscriber::{FilterSet, Subscription};
use crate::topic::Topic;
use crate::transport::{BusError, BusMessage, Transport};
use crate::DEFAULT_CHANNEL_CAPACITY;

/// In-memory implementation of the bus.
pub struct InMemoryBroker {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<BusMessage>,

    /// Active subscription count by filter description.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryBroker {
    /// Create a new broker with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broker with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to messages matching a filter set.
    ///
    /// Returns a [`Subscription`] handle used to receive messages. The
    /// filter set stays shared with the caller, so filters added later
    /// apply to messages not yet received.
    #[must_use]
    pub fn subscribe(&self, filters: FilterSet) -> Subscription {
        let receiver = self.sender.subscribe();
        let tracking_key = filters.describe();

        // Track subscription
        {
            if let Ok(mut subs) = self.subscriptions.write() {
                *subs.entry(tracking_key.clone()).or_insert(0) += 1;
            }
        }

        debug!(filters = %tracking_key, "New subscription created");

        Subscription::new(receiver, filters, self.subscriptions.clone(), tracking_key)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError> {
        let topic = Topic::parse(topic)?;

        // Always increment counter (publish was attempted)
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(BusMessage {
            topic: topic.clone(),
            payload,
        }) {
            Ok(receiver_count) => {
                debug!(
                    topic = %topic,
                    receivers = receiver_count,
                    "Message published"
                );
                Ok(())
            }
            Err(e) => {
                // No receivers - best-effort delivery, not an error
                warn!(
                    topic = %topic,
                    error = %e,
                    "Message dropped (no receivers)"
                );
                Ok(())
            }
        }
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
