//! # Subscriptions
//!
//! The delivery side of the in-memory broker.
//!
//! A [`Subscription`] receives every published [`BusMessage`] and filters
//! it against a [`FilterSet`]. The filter set is shared and growable so a
//! running service can add topics (e.g. when a proxy initializes) without
//! re-subscribing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::topic::{Topic, TopicFilter};
use crate::transport::BusMessage;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was closed.
    #[error("Bus closed")]
    Closed,
}

/// A shared, growable set of topic filters.
///
/// An empty set matches nothing; [`FilterSet::all`] produces a catch-all.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Arc<RwLock<Vec<TopicFilter>>>,
}

impl FilterSet {
    /// Create an empty filter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set containing the given filters.
    #[must_use]
    pub fn from_filters(filters: Vec<TopicFilter>) -> Self {
        Self {
            filters: Arc::new(RwLock::new(filters)),
        }
    }

    /// Create a set matching every topic.
    ///
    /// # Panics
    ///
    /// Never panics; `#` is a statically valid filter.
    #[must_use]
    pub fn all() -> Self {
        Self::from_filters(vec![TopicFilter::parse("#").expect("valid filter")])
    }

    /// Add a filter to the set. Duplicate filters are ignored.
    pub fn insert(&self, filter: TopicFilter) {
        if let Ok(mut filters) = self.filters.write() {
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }
    }

    /// Remove a filter from the set.
    pub fn remove(&self, filter: &TopicFilter) {
        if let Ok(mut filters) = self.filters.write() {
            filters.retain(|f| f != filter);
        }
    }

    /// Check whether any filter matches the topic.
    #[must_use]
    pub fn matches(&self, topic: &Topic) -> bool {
        match self.filters.read() {
            Ok(filters) => filters.iter().any(|f| f.matches(topic)),
            Err(_) => false,
        }
    }

    /// A stable description of the current filters, used for tracking.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.filters.read() {
            Ok(filters) => filters
                .iter()
                .map(TopicFilter::as_str)
                .collect::<Vec<_>>()
                .join(","),
            Err(_) => String::new(),
        }
    }
}

/// A subscription handle for receiving messages.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusMessage>,

    /// Filters for this subscription.
    filters: FilterSet,

    /// Reference to subscription tracking (for cleanup).
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Tracking key for this subscription.
    tracking_key: String,
}

impl Subscription {
    /// Create a new subscription.
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        filters: FilterSet,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        tracking_key: String,
    ) -> Self {
        Self {
            receiver,
            filters,
            subscriptions,
            tracking_key,
        }
    }

    /// Receive the next message that matches the filter set.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next matching message
    /// - `None` - The channel was closed (broker dropped)
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
            };

            if self.filters.matches(&message.topic) {
                return Some(message);
            }
            // Message does not match, continue waiting
        }
    }

    /// Try to receive the next matching message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Closed`] if the channel was closed.
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, SubscriptionError> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filters.matches(&message.topic) {
                return Ok(Some(message));
            }
        }
    }

    /// The filter set for this subscription.
    #[must_use]
    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Decrement subscription count
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        let Some(count) = subs.get_mut(&self.tracking_key) else {
            debug!(filters = %self.tracking_key, "Subscription dropped");
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.tracking_key);
        }
        debug!(filters = %self.tracking_key, "Subscription dropped");
    }
}
