//! # Edge Bus - Pub/Sub Transport for Inter-Service Communication
//!
//! Topic-based message transport for device-side microservices.
//!
//! The ISC core only requires two things from a transport:
//!
//! - `publish(topic, payload)` via the [`Transport`] trait
//! - a subscription mechanism delivering `(topic, payload)` pairs,
//!   here modelled as [`Subscription`] handles
//!
//! Connect/reconnect, QoS and persistence are the concern of whatever
//! backs the [`Transport`] implementation. [`InMemoryBroker`] is the
//! bundled implementation used for single-process deployments and tests.
//!
//! ## Topic grammar
//!
//! Topics are `/`-separated segment strings, e.g. `edge/gnss/request/...`.
//! Subscription filters support the `+` (single segment) and `#`
//! (trailing multi-segment) wildcards via [`TopicFilter`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod subscriber;
pub mod topic;
pub mod transport;

// Re-export main types
pub use broker::InMemoryBroker;
pub use subscriber::{FilterSet, Subscription, SubscriptionError};
pub use topic::{Topic, TopicError, TopicFilter};
pub use transport::{BusError, BusMessage, Transport};

/// Maximum messages to buffer per subscriber before older ones are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Topic segment separator.
pub const TOPIC_SEPARATOR: char = '/';
