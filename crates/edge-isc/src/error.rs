//! # ISC Error Types
//!
//! Defines all error conditions for the inter-service communication core.
//!
//! Propagation policy: parsing and lookup failures during dispatch are
//! handled locally (logged, message dropped) and never abort the router.
//! Only the proxy's blocking property/task operations propagate an error
//! to their caller. No failure in this subsystem terminates the process.

use edge_bus::BusError;
use thiserror::Error;

/// Inter-service communication error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IscError {
    /// A property with this name is already registered for the owner.
    #[error("Property {name} is already registered")]
    DuplicateName { name: String },

    /// Get/set referenced a name the owner has not registered.
    #[error("Unknown property {name}")]
    UnknownProperty { name: String },

    /// Set referenced a read-only (`info`) property.
    #[error("Property {name} is read-only")]
    ReadOnlyProperty { name: String },

    /// A mutator rejected the supplied value.
    #[error("Invalid value for property {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// A blocking request exceeded its deadline.
    #[error("Request {uid} timed out after {waited_ms} ms")]
    Timeout { uid: String, waited_ms: u64 },

    /// A payload failed to parse as the expected structure.
    #[error("Malformed message on {topic}: {reason}")]
    MalformedMessage { topic: String, reason: String },

    /// A task was added while one is already outstanding on a proxy.
    #[error("A request is already outstanding on proxy {tag}")]
    QueueBusy { tag: String },

    /// A task with this uid is already queued.
    #[error("Task {uid} is already queued")]
    DuplicateTask { uid: String },

    /// A proxy operation was attempted before `initialize()`.
    #[error("Proxy {tag} is not initialized")]
    NotInitialized { tag: String },

    /// The underlying transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),
}
