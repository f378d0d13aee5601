//! # Microservice Router
//!
//! The service-side half of the ISC layer.
//!
//! A [`Microservice`] owns a property registry, optional features and
//! proxies, and a generic task queue. Incoming bus traffic is dispatched
//! in a fixed order: built-in protocol handlers first (rollcall, property
//! list/get/set), then features in attachment order, then proxies, then
//! a debug-logged drop. Dispatch is never fatal; malformed traffic is
//! logged and discarded.
//!
//! Attachment (registering properties, adding features and proxies)
//! requires `&mut self`; dispatch takes `&self`. The type system keeps
//! the registry shape fixed once the service is shared.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use edge_bus::{BusError, FilterSet, Subscription, Topic, TopicFilter, Transport};

use crate::error::IscError;
use crate::feature::Feature;
use crate::message::{as_payload, stamp, Payload, UID_KEY};
use crate::property::{PropertyDef, PropertyKind, PropertyRegistry};
use crate::proxy::{MicroserviceProxy, ERRORS_KEY, NAMES_KEY, PROPERTIES_KEY};
use crate::task::{IscTask, TaskQueueHandle};

/// Wire key requesting that an applied change be re-offered to features.
pub const REPORT_CHANGE_KEY: &str = "reportChange";

/// Interval between expired-task sweeps when expiry is enabled.
const TASK_PURGE_INTERVAL: Duration = Duration::from_secs(1);

const ROLLCALL_SEGMENT: &str = "rollcall";

/// How unknown names in a get request are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownGetPolicy {
    /// List unknown names in the response `errors` array.
    #[default]
    Report,
    /// Leave unknown names out of the response silently.
    Omit,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct MicroserviceConfig {
    /// Service tag, lowercase; forms every topic `<root>/<tag>/...`.
    pub tag: String,
    /// Topic hierarchy root.
    pub topic_root: String,
    /// Prefix wire names with the service tag.
    pub use_wire_tag: bool,
    /// Unknown-name handling for get requests.
    pub unknown_get_policy: UnknownGetPolicy,
}

impl MicroserviceConfig {
    /// Configuration with defaults for a service tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            topic_root: crate::DEFAULT_TOPIC_ROOT.to_string(),
            use_wire_tag: false,
            unknown_get_policy: UnknownGetPolicy::default(),
        }
    }

    /// Override the topic root.
    #[must_use]
    pub fn topic_root(mut self, root: impl Into<String>) -> Self {
        self.topic_root = root.into();
        self
    }

    /// Prefix wire names with the service tag.
    #[must_use]
    pub fn use_wire_tag(mut self, enabled: bool) -> Self {
        self.use_wire_tag = enabled;
        self
    }

    /// Choose the unknown-name policy for get requests.
    #[must_use]
    pub fn unknown_get_policy(mut self, policy: UnknownGetPolicy) -> Self {
        self.unknown_get_policy = policy;
        self
    }
}

/// Publish handle given to features.
///
/// Features notify through this instead of calling back into the
/// router's dispatch.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    tag: String,
    topic_root: String,
}

impl Notifier {
    /// Publish a payload, stamping `ts`.
    ///
    /// A subtopic (no topic-root prefix) is published under
    /// `<root>/<tag>/`; a full topic is published as given.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the publish.
    pub async fn notify(&self, topic: &str, mut payload: Payload) -> Result<(), IscError> {
        let full_topic = if topic.starts_with(&format!("{}/", self.topic_root)) {
            topic.to_string()
        } else {
            format!("{}/{}/{topic}", self.topic_root, self.tag)
        };
        stamp(&mut payload);
        self.transport
            .publish(&full_topic, Value::Object(payload))
            .await?;
        Ok(())
    }
}

/// A device-side microservice on the ISC bus.
pub struct Microservice {
    config: MicroserviceConfig,
    transport: Arc<dyn Transport>,
    filters: FilterSet,
    registry: PropertyRegistry,
    rollcall_properties: Vec<String>,
    features: Vec<Arc<dyn Feature>>,
    proxies: Vec<Arc<MicroserviceProxy>>,
    tasks: TaskQueueHandle,
    purger: Mutex<Option<JoinHandle<()>>>,
}

impl Microservice {
    /// Create a service over a transport.
    ///
    /// The filter set starts with the rollcall broadcast and the
    /// service's own request topics; proxies grow it at initialization.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the tag produces invalid topics.
    pub fn new(config: MicroserviceConfig, transport: Arc<dyn Transport>) -> Result<Self, IscError> {
        let filters = FilterSet::new();
        for pattern in [
            format!("{}/+/{ROLLCALL_SEGMENT}", config.topic_root),
            format!("{}/{}/request/#", config.topic_root, config.tag),
        ] {
            filters.insert(TopicFilter::parse(&pattern).map_err(BusError::Topic)?);
        }
        let registry = PropertyRegistry::new(config.tag.clone(), config.use_wire_tag);
        Ok(Self {
            config,
            transport,
            filters,
            registry,
            rollcall_properties: Vec::new(),
            features: Vec::new(),
            proxies: Vec::new(),
            tasks: TaskQueueHandle::new(),
            purger: Mutex::new(None),
        })
    }

    /// Service tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    /// The shared filter set, for subscribing on a broker and for proxy
    /// construction.
    #[must_use]
    pub fn filters(&self) -> FilterSet {
        self.filters.clone()
    }

    /// A publish handle for features.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier {
            transport: Arc::clone(&self.transport),
            tag: self.config.tag.clone(),
            topic_root: self.config.topic_root.clone(),
        }
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}/{suffix}", self.config.topic_root, self.config.tag)
    }

    // ---- attachment ----

    /// Register a property.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateName`] on native or wire name
    /// collision; the registry is unchanged on failure.
    pub fn register_property(&mut self, def: PropertyDef) -> Result<(), IscError> {
        self.registry.register(def)
    }

    /// Attach a feature and register its contributed properties, each
    /// prefixed with the feature tag.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateName`] for a duplicate feature tag
    /// or property collision.
    pub fn add_feature(&mut self, feature: Arc<dyn Feature>) -> Result<(), IscError> {
        let tag = feature.tag().to_string();
        if self.features.iter().any(|f| f.tag() == tag) {
            return Err(IscError::DuplicateName { name: tag });
        }
        for def in feature.properties() {
            self.registry.register_prefixed(def, Some(&tag))?;
        }
        info!(service = %self.config.tag, feature = %tag, "Feature attached");
        self.features.push(feature);
        Ok(())
    }

    /// Attach a proxy, placing it last in the dispatch chain.
    ///
    /// Construct the proxy with [`Microservice::filters`] so its
    /// subscriptions ride the service's bus subscription.
    pub fn attach_proxy(&mut self, proxy: Arc<MicroserviceProxy>) {
        info!(service = %self.config.tag, proxy = %proxy.tag(), "Proxy attached");
        self.proxies.push(proxy);
    }

    /// Include a registered property in rollcall responses.
    ///
    /// The rollcall list is explicit and independent of the general
    /// listing mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn rollcall_property_add(&mut self, name: &str) -> Result<(), IscError> {
        if !self.registry.contains(name) {
            return Err(IscError::UnknownProperty {
                name: name.to_string(),
            });
        }
        if !self.rollcall_properties.iter().any(|n| n == name) {
            self.rollcall_properties.push(name.to_string());
        }
        Ok(())
    }

    /// Remove a property from rollcall responses.
    pub fn rollcall_property_remove(&mut self, name: &str) {
        self.rollcall_properties.retain(|n| n != name);
    }

    // ---- local property access ----

    /// Current value of a property by native name.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn property(&self, name: &str) -> Result<Value, IscError> {
        self.registry.get(name)
    }

    /// Non-hidden native property names, in registration order.
    #[must_use]
    pub fn properties_list(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Native names of one classification.
    #[must_use]
    pub fn properties_by_kind(&self, kind: PropertyKind) -> Vec<String> {
        self.registry.names_by_kind(kind)
    }

    /// Hide a property from local listing.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn property_hide(&mut self, name: &str) -> Result<(), IscError> {
        self.registry.hide(name)
    }

    /// Unhide a previously hidden property.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn property_unhide(&mut self, name: &str) -> Result<(), IscError> {
        self.registry.unhide(name)
    }

    /// Hide a property from ISC exposition while keeping it local.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unknown wire names.
    pub fn isc_property_hide(&mut self, wire_name: &str) -> Result<(), IscError> {
        self.registry.isc_hide(wire_name)
    }

    /// Restore ISC exposition of a property.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unknown wire names.
    pub fn isc_property_unhide(&mut self, wire_name: &str) -> Result<(), IscError> {
        self.registry.isc_unhide(wire_name)
    }

    /// Status summaries of all attached features, keyed by feature tag.
    #[must_use]
    pub fn status_all(&self) -> Payload {
        let mut all = Payload::new();
        for feature in &self.features {
            all.insert(
                feature.tag().to_string(),
                Value::Object(feature.status()),
            );
        }
        all
    }

    // ---- publishing ----

    /// Publish a payload, stamping `ts`.
    ///
    /// A subtopic is published under `<root>/<tag>/`; a full topic is
    /// published as given.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the publish.
    pub async fn notify(&self, topic: &str, payload: Payload) -> Result<(), IscError> {
        self.notifier().notify(topic, payload).await
    }

    /// Broadcast a rollcall asking peer services to identify themselves.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the publish.
    pub async fn rollcall(&self) -> Result<(), IscError> {
        let mut payload = Payload::new();
        payload.insert(
            UID_KEY.to_string(),
            Value::from(Uuid::new_v4().to_string()),
        );
        self.notify(ROLLCALL_SEGMENT, payload).await
    }

    // ---- generic task queue ----

    /// A handle to the shared task queue, for features that issue their
    /// own outbound requests.
    #[must_use]
    pub fn tasks(&self) -> TaskQueueHandle {
        self.tasks.clone()
    }

    /// Queue an outstanding task for later correlation.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateTask`] for a duplicate uid.
    pub fn task_add(&self, task: IscTask) -> Result<(), IscError> {
        self.tasks.add(task)
    }

    /// Retrieve (and remove) a queued task by uid.
    #[must_use]
    pub fn task_get(&self, uid: &str) -> Option<IscTask> {
        self.tasks.get(uid)
    }

    /// True if a task with this uid is queued.
    #[must_use]
    pub fn is_queued(&self, uid: &str) -> bool {
        self.tasks.is_queued(uid)
    }

    /// Remove expired tasks now, firing their timeout callbacks.
    pub fn remove_expired(&self) {
        self.tasks.remove_expired();
    }

    /// Enable or disable the periodic expired-task sweep.
    pub fn task_expiry_enable(&self, enabled: bool) {
        let Ok(mut purger) = self.purger.lock() else {
            return;
        };
        if enabled {
            if purger.is_some() {
                return;
            }
            let tasks = self.tasks.clone();
            *purger = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(TASK_PURGE_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    tasks.remove_expired();
                }
            }));
        } else if let Some(handle) = purger.take() {
            handle.abort();
        }
    }

    // ---- dispatch ----

    /// Drive dispatch from a broker subscription until the bus closes.
    pub async fn run(&self, subscription: &mut Subscription) {
        info!(service = %self.config.tag, "Service running");
        while let Some(message) = subscription.recv().await {
            self.handle_message(message.topic.as_str(), &message.payload)
                .await;
        }
        info!(service = %self.config.tag, "Bus closed, service stopping");
    }

    /// Dispatch one incoming message.
    ///
    /// Never fatal: malformed or unclaimed traffic is logged and
    /// dropped.
    pub async fn handle_message(&self, topic: &str, payload: &Value) {
        let Ok(object) = as_payload(payload, topic) else {
            warn!(topic, "Dropping non-object payload");
            return;
        };
        let Ok(parsed) = Topic::parse(topic) else {
            warn!(topic, "Dropping message with invalid topic");
            return;
        };

        if self.is_rollcall(&parsed) {
            self.on_rollcall(&parsed, object).await;
            return;
        }
        if topic == self.topic("request/properties/list") {
            self.on_properties_list(object).await;
            return;
        }
        if topic == self.topic("request/properties/get") {
            self.on_properties_get(object).await;
            return;
        }
        if topic == self.topic("request/properties/set") {
            self.on_properties_set(topic, object, payload).await;
            return;
        }
        if self.offer_chain(topic, payload).await {
            return;
        }
        debug!(topic, "Unhandled message");
    }

    async fn offer_chain(&self, topic: &str, payload: &Value) -> bool {
        for feature in &self.features {
            if feature.on_isc_message(topic, payload).await {
                debug!(topic, feature = %feature.tag(), "Message claimed by feature");
                return true;
            }
        }
        for proxy in &self.proxies {
            if proxy.handle_message(topic, payload).await {
                debug!(topic, proxy = %proxy.tag(), "Message claimed by proxy");
                return true;
            }
        }
        false
    }

    fn is_rollcall(&self, topic: &Topic) -> bool {
        topic.depth() == 3
            && topic.segment(0) == Some(self.config.topic_root.as_str())
            && topic.segment(2) == Some(ROLLCALL_SEGMENT)
    }

    /// Answer a peer's rollcall, echoing its uid verbatim.
    async fn on_rollcall(&self, topic: &Topic, request: &Payload) {
        if topic.segment(1) == Some(self.config.tag.as_str()) {
            debug!(service = %self.config.tag, "Ignoring own rollcall");
            return;
        }
        let mut response = Payload::new();
        match request.get(UID_KEY) {
            Some(uid) => {
                response.insert(UID_KEY.to_string(), uid.clone());
            }
            None => warn!(service = %self.config.tag, "Rollcall without uid"),
        }
        for name in &self.rollcall_properties {
            let (Some(wire_name), Ok(value)) =
                (self.registry.wire_name(name), self.registry.get(name))
            else {
                continue;
            };
            response.insert(wire_name, value);
        }
        self.publish_logged(&self.topic("rollcall/response"), response)
            .await;
    }

    async fn on_properties_list(&self, request: &Payload) {
        let mut response = Payload::new();
        if let Some(uid) = request.get(UID_KEY) {
            response.insert(UID_KEY.to_string(), uid.clone());
        }
        response.insert(
            PROPERTIES_KEY.to_string(),
            Value::Array(
                self.registry
                    .exposed_names()
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
        );
        self.publish_logged(&self.topic("info/properties/list"), response)
            .await;
    }

    async fn on_properties_get(&self, request: &Payload) {
        let mut errors = Vec::new();
        let requested: Vec<String> = match request.get(NAMES_KEY).and_then(Value::as_array) {
            Some(names) if !names.is_empty() => names
                .iter()
                .filter_map(|entry| match entry.as_str() {
                    Some(name) => Some(name.to_string()),
                    None => {
                        match self.config.unknown_get_policy {
                            UnknownGetPolicy::Report => errors
                                .push(Value::from(format!("Invalid property name {entry}"))),
                            UnknownGetPolicy::Omit => {
                                debug!(%entry, "Omitting non-string name from get");
                            }
                        }
                        None
                    }
                })
                .collect(),
            _ => self.registry.exposed_names(),
        };
        let mut properties = Payload::new();
        for name in requested {
            match self.registry.get_isc(&name) {
                Ok(value) => {
                    properties.insert(name, value);
                }
                Err(err) => match self.config.unknown_get_policy {
                    UnknownGetPolicy::Report => errors.push(Value::from(err.to_string())),
                    UnknownGetPolicy::Omit => debug!(name, "Omitting unknown property from get"),
                },
            }
        }
        self.publish_values(request, properties, errors).await;
    }

    async fn on_properties_set(&self, topic: &str, request: &Payload, payload: &Value) {
        let Some(values) = request.get(PROPERTIES_KEY).and_then(Value::as_object) else {
            warn!(topic, "Set request without properties object");
            return;
        };
        let mut applied = Payload::new();
        let mut errors = Vec::new();
        for (name, value) in values {
            match self.registry.set_isc(name, value) {
                Ok(in_effect) => {
                    applied.insert(name.clone(), in_effect);
                }
                Err(err) => errors.push(Value::from(err.to_string())),
            }
        }
        self.publish_values(request, applied, errors).await;
        // A change report rides the normal chain so features can react.
        if request.get(REPORT_CHANGE_KEY).and_then(Value::as_bool) == Some(true)
            && !self.offer_chain(topic, payload).await
        {
            debug!(topic, "Change report unclaimed");
        }
    }

    async fn publish_values(&self, request: &Payload, properties: Payload, errors: Vec<Value>) {
        let mut response = Payload::new();
        if let Some(uid) = request.get(UID_KEY) {
            response.insert(UID_KEY.to_string(), uid.clone());
        }
        response.insert(PROPERTIES_KEY.to_string(), Value::Object(properties));
        if !errors.is_empty() {
            response.insert(ERRORS_KEY.to_string(), Value::Array(errors));
        }
        self.publish_logged(&self.topic("info/properties/values"), response)
            .await;
    }

    async fn publish_logged(&self, topic: &str, mut payload: Payload) {
        stamp(&mut payload);
        if let Err(err) = self
            .transport
            .publish(topic, Value::Object(payload))
            .await
        {
            warn!(topic, error = %err, "Publish failed");
        }
    }
}

impl Drop for Microservice {
    fn drop(&mut self) {
        if let Ok(mut purger) = self.purger.lock() {
            if let Some(handle) = purger.take() {
                handle.abort();
            }
        }
    }
}
