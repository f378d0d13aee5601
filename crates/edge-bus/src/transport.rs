//! # Transport Contract
//!
//! The publishing side of the bus as seen by the ISC core.
//!
//! The core deliberately requires nothing beyond [`Transport::publish`];
//! reconnect, QoS and persistence live behind the implementation.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::topic::{Topic, TopicError};

/// Errors from publish operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The topic failed validation.
    #[error("Invalid topic: {0}")]
    Topic(#[from] TopicError),

    /// The broker or connection is no longer available.
    #[error("Bus closed")]
    Closed,
}

/// A message as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// The concrete topic the message was published on.
    pub topic: Topic,
    /// The structured payload.
    pub payload: Value,
}

/// Trait for publishing messages to the bus.
///
/// Microservices and proxies hold an `Arc<dyn Transport>`; everything
/// they emit flows through this single operation. No acknowledgement is
/// awaited beyond handing the message to the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the topic is invalid or the transport is
    /// no longer usable. Delivery itself is best-effort.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError>;

    /// Total messages handed to the transport.
    fn messages_published(&self) -> u64;
}
