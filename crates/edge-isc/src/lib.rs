//! # Edge ISC - Inter-Service Communication Core
//!
//! Coordination layer for loosely-coupled device-side microservices on a
//! publish/subscribe bus.
//!
//! Each service is a [`Microservice`]: it exposes declared properties
//! (read-only `info`, read/write `config`), answers the rollcall
//! discovery protocol, and dispatches incoming traffic through a fixed
//! chain of built-in handlers, [`Feature`]s and [`MicroserviceProxy`]s.
//!
//! A proxy is the local representative of a remote service: it caches
//! the remote's properties with a ttl and offers blocking-style async
//! get/set operations under a single-slot, timeout-safe request
//! discipline.
//!
//! The transport is anything implementing [`edge_bus::Transport`];
//! `edge_bus::InMemoryBroker` covers single-process deployments and
//! tests.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod cache;
pub mod error;
pub mod feature;
pub mod message;
pub mod microservice;
pub mod property;
pub mod proxy;
pub mod task;

// Re-export main types
pub use cache::PropertyCache;
pub use error::IscError;
pub use feature::Feature;
pub use message::{timestamp_ms, Payload};
pub use microservice::{Microservice, MicroserviceConfig, Notifier, UnknownGetPolicy};
pub use property::{PropertyDef, PropertyDescriptor, PropertyKind, PropertyRegistry, Visibility};
pub use proxy::{MicroserviceProxy, ProxyConfig, ProxyHandler};
pub use task::{IscTask, TaskMeta, TaskQueue, TaskQueueHandle};

/// Default root of the topic hierarchy.
pub const DEFAULT_TOPIC_ROOT: &str = "edge";
