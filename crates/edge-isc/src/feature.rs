//! # Features
//!
//! Pluggable capability modules attached to a microservice.
//!
//! Features contribute properties, report status, and may claim ISC
//! messages. The router offers unclaimed messages to each feature in
//! attachment order; the first to return `true` ends the chain. Features
//! publish through the [`Notifier`](crate::microservice::Notifier) handle
//! given at attachment and never call back into the router's dispatch.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::property::PropertyDef;

/// A pluggable capability of a microservice.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Short name, unique within the owning service. Also the prefix
    /// applied to contributed property names.
    fn tag(&self) -> &str;

    /// Properties this feature contributes to the owner's registry.
    ///
    /// Called once at attachment. Default: none.
    fn properties(&self) -> Vec<PropertyDef> {
        Vec::new()
    }

    /// Current status summary, aggregated by the owner's `status_all`.
    fn status(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Offer an ISC message not claimed by the built-in handlers.
    ///
    /// Return `true` to claim the message and end the dispatch chain.
    /// Must not panic. Default: decline.
    async fn on_isc_message(&self, topic: &str, payload: &Value) -> bool {
        let _ = (topic, payload);
        false
    }
}
