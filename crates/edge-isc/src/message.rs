//! # Message Helpers
//!
//! Payload shaping shared by the router and proxies.
//!
//! Every ISC payload is a flat JSON object. Outbound payloads are stamped
//! with a `ts` field (Unix epoch milliseconds) at send time unless the
//! caller already set one.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::error::IscError;

/// A structured ISC payload.
pub type Payload = Map<String, Value>;

/// Wire key carrying the send timestamp.
pub const TS_KEY: &str = "ts";

/// Wire key carrying the request identifier.
pub const UID_KEY: &str = "uid";

/// Current Unix timestamp in milliseconds.
#[must_use]
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Stamp a payload with `ts` if the caller did not set one.
pub fn stamp(payload: &mut Payload) {
    payload
        .entry(TS_KEY.to_string())
        .or_insert_with(|| Value::from(timestamp_ms()));
}

/// Extract the request identifier, if present and a string.
#[must_use]
pub fn uid_of(payload: &Payload) -> Option<&str> {
    payload.get(UID_KEY).and_then(Value::as_str)
}

/// Interpret a value as a payload object.
///
/// # Errors
///
/// Returns [`IscError::MalformedMessage`] if the value is not a JSON
/// object.
pub fn as_payload<'a>(value: &'a Value, topic: &str) -> Result<&'a Payload, IscError> {
    value.as_object().ok_or_else(|| IscError::MalformedMessage {
        topic: topic.to_string(),
        reason: "payload is not a JSON object".to_string(),
    })
}
