//! # Microservice Proxy
//!
//! Local representative of a remote microservice.
//!
//! A proxy subscribes to the remote service's `event/#` and `info/#`
//! topics, caches its exposed properties, and provides blocking-style
//! async property operations built on a single-slot request discipline:
//! at most one request is outstanding at a time, every request carries a
//! deadline, and the slot is freed on completion or expiry - whichever
//! comes first wins, the loser is a no-op.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use edge_bus::{BusError, FilterSet, TopicFilter, Transport};

use crate::cache::{PropertyCache, DEFAULT_CACHE_TTL};
use crate::error::IscError;
use crate::message::{stamp, uid_of, Payload, UID_KEY};
use crate::task::{IscTask, TaskCallback, TaskMeta, TimeoutCallback};

/// Default deadline for blocking property round trips.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the initialization round trip.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire key holding the property map in requests and responses.
pub const PROPERTIES_KEY: &str = "properties";

/// Wire key holding requested property names.
pub const NAMES_KEY: &str = "names";

/// Wire key holding remote-reported per-name errors.
pub const ERRORS_KEY: &str = "errors";

const TASK_INITIALIZE: &str = "initialize";
const TASK_PROPERTY_GET: &str = "property_get";
const TASK_PROPERTY_SET: &str = "property_set";

/// Cache marker meaning the full property set is warm.
const CACHE_ALL: &str = "all";

/// Callback fired once when initialization succeeds or times out.
pub type InitCallback = Box<dyn FnOnce(bool) + Send>;

/// User handler for subscribed traffic the proxy does not consume.
#[async_trait]
pub trait ProxyHandler: Send + Sync {
    /// Offer a message; return `true` to claim it.
    async fn on_message(&self, topic: &str, payload: &Value) -> bool;
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Tag of the remote service this proxy represents.
    pub tag: String,
    /// Topic hierarchy root.
    pub topic_root: String,
    /// Lifetime of cached property values.
    pub cache_ttl: Duration,
    /// Deadline for the initialization round trip.
    pub init_timeout: Duration,
    /// Deadline for blocking property round trips.
    pub request_timeout: Duration,
}

impl ProxyConfig {
    /// Configuration with defaults for a remote service tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            topic_root: crate::DEFAULT_TOPIC_ROOT.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the topic root.
    #[must_use]
    pub fn topic_root(mut self, root: impl Into<String>) -> Self {
        self.topic_root = root.into();
        self
    }

    /// Override the cache ttl.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the initialization deadline.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Override the request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Idle,
    Pending,
    Complete,
}

/// The single outstanding request.
struct ActiveTask {
    uid: String,
    task_type: String,
    meta: TaskMeta,
    callback: Option<TaskCallback>,
    timeout_callback: Option<TimeoutCallback>,
    watchdog: Option<JoinHandle<()>>,
    /// Response matched; awaiting `task_complete`.
    responded: bool,
}

#[derive(Default)]
struct TaskSlot {
    current: Option<ActiveTask>,
}

/// Local representative of a remote microservice.
pub struct MicroserviceProxy {
    config: ProxyConfig,
    transport: Arc<dyn Transport>,
    filters: FilterSet,
    slot: Arc<Mutex<TaskSlot>>,
    cache: Arc<Mutex<PropertyCache>>,
    store: Arc<Mutex<Payload>>,
    init_state: Arc<Mutex<InitState>>,
    init_callback: Arc<Mutex<Option<InitCallback>>>,
    handler: Option<Arc<dyn ProxyHandler>>,
}

impl MicroserviceProxy {
    /// Create a proxy over a transport.
    ///
    /// The filter set is shared with the owner's subscription so topics
    /// added at initialization take effect immediately.
    #[must_use]
    pub fn new(config: ProxyConfig, transport: Arc<dyn Transport>, filters: FilterSet) -> Self {
        let cache = PropertyCache::with_ttl(config.cache_ttl);
        Self {
            config,
            transport,
            filters,
            slot: Arc::new(Mutex::new(TaskSlot::default())),
            cache: Arc::new(Mutex::new(cache)),
            store: Arc::new(Mutex::new(Payload::new())),
            init_state: Arc::new(Mutex::new(InitState::Idle)),
            init_callback: Arc::new(Mutex::new(None)),
            handler: None,
        }
    }

    /// Attach a callback fired once with the initialization outcome.
    #[must_use]
    pub fn with_init_callback(self, callback: impl FnOnce(bool) + Send + 'static) -> Self {
        if let Ok(mut slot) = self.init_callback.lock() {
            *slot = Some(Box::new(callback));
        }
        self
    }

    /// Attach a handler for subscribed traffic the proxy does not consume.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ProxyHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Tag of the remote service.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    /// True once the initialization round trip has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.init_state
            .lock()
            .is_ok_and(|s| *s == InitState::Complete)
    }

    /// True while a request is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.slot.lock().is_ok_and(|s| s.current.is_some())
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}/{suffix}", self.config.topic_root, self.config.tag)
    }

    fn values_topic(&self) -> String {
        self.topic("info/properties/values")
    }

    /// Subscribe to the remote service and request its full property set.
    ///
    /// The outcome is reported through the init callback; success also
    /// warms the property cache. Repeat calls while pending or complete
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::QueueBusy`] if a request is already
    /// outstanding, or a transport error from the request publish.
    pub async fn initialize(&self) -> Result<(), IscError> {
        {
            let Ok(mut state) = self.init_state.lock() else {
                return Ok(());
            };
            if *state != InitState::Idle {
                debug!(tag = %self.config.tag, "Proxy already initializing or initialized");
                return Ok(());
            }
            *state = InitState::Pending;
        }
        for suffix in ["event/#", "info/#"] {
            let filter = TopicFilter::parse(&self.topic(suffix)).map_err(BusError::Topic)?;
            self.filters.insert(filter);
        }

        let uid = Uuid::new_v4().to_string();
        let task = {
            let cache = Arc::clone(&self.cache);
            let store = Arc::clone(&self.store);
            let slot = Arc::clone(&self.slot);
            let state = Arc::clone(&self.init_state);
            let init_callback = Arc::clone(&self.init_callback);
            let complete_uid = uid.clone();
            let tag = self.config.tag.clone();
            let timeout_state = Arc::clone(&self.init_state);
            let timeout_callback = Arc::clone(&self.init_callback);
            let timeout_tag = self.config.tag.clone();
            IscTask::new(TASK_INITIALIZE)
                .with_uid(uid.clone())
                .with_lifetime(Some(self.config.init_timeout))
                .on_complete(move |value, _meta| {
                    if let Some(response) = value.as_object() {
                        absorb_values(&cache, &store, response, true);
                    }
                    if let Ok(mut s) = state.lock() {
                        *s = InitState::Complete;
                    }
                    complete_slot(&slot, &complete_uid);
                    fire_init(&init_callback, true);
                    debug!(tag = %tag, "Proxy initialized");
                })
                .on_timeout(move |_meta| {
                    // Back to idle so initialize() can be retried.
                    if let Ok(mut s) = timeout_state.lock() {
                        *s = InitState::Idle;
                    }
                    fire_init(&timeout_callback, false);
                    warn!(tag = %timeout_tag, "Proxy initialization timed out");
                })
        };
        self.task_add(task)?;

        let mut request = Payload::new();
        request.insert(UID_KEY.to_string(), Value::from(uid.clone()));
        stamp(&mut request);
        if let Err(err) = self
            .transport
            .publish(&self.topic("request/properties/get"), Value::Object(request))
            .await
        {
            self.task_complete(&uid);
            if let Ok(mut s) = self.init_state.lock() {
                *s = InitState::Idle;
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// All known properties of the remote service.
    ///
    /// Served from the warm store while the full set is fresh; otherwise
    /// one get round trip, awaiting the response up to `request_timeout`.
    ///
    /// # Errors
    ///
    /// - [`IscError::NotInitialized`] before [`MicroserviceProxy::initialize`]
    /// - [`IscError::QueueBusy`] while another request is outstanding
    /// - [`IscError::Timeout`] if the deadline elapses; no stale or
    ///   partial data is returned
    pub async fn properties(&self) -> Result<Payload, IscError> {
        self.check_initialized()?;
        let warm = self
            .cache
            .lock()
            .is_ok_and(|mut cache| cache.get_cached(CACHE_ALL).is_some());
        if warm {
            if let Ok(store) = self.store.lock() {
                debug!(tag = %self.config.tag, "Serving properties from warm store");
                return Ok(store.clone());
            }
        }
        self.round_trip(TASK_PROPERTY_GET, "request/properties/get", Payload::new(), true)
            .await
    }

    /// Fetch a subset of properties by wire name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MicroserviceProxy::properties`].
    pub async fn property_get(&self, names: &[&str]) -> Result<Payload, IscError> {
        self.check_initialized()?;
        let mut request = Payload::new();
        request.insert(
            NAMES_KEY.to_string(),
            Value::Array(names.iter().map(|n| Value::from(*n)).collect()),
        );
        self.round_trip(TASK_PROPERTY_GET, "request/properties/get", request, false)
            .await
    }

    /// Apply configuration values on the remote service.
    ///
    /// Returns the values the remote confirmed; only those refresh the
    /// cache. Remote-reported per-name errors are logged.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MicroserviceProxy::properties`].
    pub async fn property_set(&self, values: Payload) -> Result<Payload, IscError> {
        self.check_initialized()?;
        let mut request = Payload::new();
        request.insert(PROPERTIES_KEY.to_string(), Value::Object(values));
        self.round_trip(TASK_PROPERTY_SET, "request/properties/set", request, false)
            .await
    }

    fn check_initialized(&self) -> Result<(), IscError> {
        let idle = self.init_state.lock().is_ok_and(|s| *s == InitState::Idle);
        if idle {
            return Err(IscError::NotInitialized {
                tag: self.config.tag.clone(),
            });
        }
        Ok(())
    }

    /// One request/response round trip against the single slot.
    async fn round_trip(
        &self,
        task_type: &str,
        request_suffix: &str,
        mut request: Payload,
        all: bool,
    ) -> Result<Payload, IscError> {
        let uid = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel::<Value>();
        let task = IscTask::new(task_type)
            .with_uid(uid.clone())
            .with_lifetime(Some(self.config.request_timeout))
            .on_complete(move |value, _meta| {
                let _ = tx.send(value);
            });
        self.task_add(task)?;

        request.insert(UID_KEY.to_string(), Value::from(uid.clone()));
        stamp(&mut request);
        let started = Instant::now();
        if let Err(err) = self
            .transport
            .publish(&self.topic(request_suffix), Value::Object(request))
            .await
        {
            self.task_complete(&uid);
            return Err(err.into());
        }

        // The watchdog drops the sender at the deadline; a closed channel
        // means the slot already expired.
        match rx.await {
            Ok(value) => {
                self.task_complete(&uid);
                let response = value.as_object().cloned().unwrap_or_default();
                Ok(absorb_values(&self.cache, &self.store, &response, all))
            }
            Err(_) => Err(IscError::Timeout {
                uid,
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Occupy the slot with a task and arm its watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::QueueBusy`] while a request is outstanding.
    pub fn task_add(&self, task: IscTask) -> Result<(), IscError> {
        let meta = task.callback_meta();
        let Ok(mut slot) = self.slot.lock() else {
            return Err(IscError::QueueBusy {
                tag: self.config.tag.clone(),
            });
        };
        if slot.current.is_some() {
            return Err(IscError::QueueBusy {
                tag: self.config.tag.clone(),
            });
        }
        let watchdog = task.lifetime.map(|lifetime| {
            let slot = Arc::clone(&self.slot);
            let uid = task.uid.clone();
            let tag = self.config.tag.clone();
            tokio::spawn(async move {
                tokio::time::sleep(lifetime).await;
                expire_slot(&slot, &uid, &tag);
            })
        });
        debug!(tag = %self.config.tag, uid = %task.uid, task_type = %task.task_type, "Task queued");
        slot.current = Some(ActiveTask {
            uid: task.uid,
            task_type: task.task_type,
            meta,
            callback: task.callback,
            timeout_callback: task.timeout_callback,
            watchdog,
            responded: false,
        });
        Ok(())
    }

    /// Offer a response payload to the outstanding task.
    ///
    /// Matches by `uid`, not arrival order. A match fires the completion
    /// callback; the slot stays occupied until
    /// [`MicroserviceProxy::task_complete`] or, failing that, until the
    /// watchdog reclaims it at the deadline. Late or unknown uids return
    /// `false`.
    pub fn task_handle(&self, payload: &Value) -> bool {
        let Some(object) = payload.as_object() else {
            return false;
        };
        let Some(uid) = uid_of(object) else {
            return false;
        };
        let matched = {
            let Ok(mut slot) = self.slot.lock() else {
                return false;
            };
            let Some(active) = slot.current.as_mut() else {
                return false;
            };
            if active.uid != uid || active.responded {
                return false;
            }
            active.responded = true;
            active.callback.take().map(|cb| (cb, active.meta.clone()))
        };
        if let Some((callback, meta)) = matched {
            callback(payload.clone(), meta);
        }
        true
    }

    /// Free the slot after a completed task.
    ///
    /// The internal property operations call this themselves; user task
    /// callbacks must call it or the slot stays occupied until expiry.
    pub fn task_complete(&self, uid: &str) {
        complete_slot(&self.slot, uid);
    }

    /// Offer a message from the owner's dispatch chain.
    ///
    /// The internal handler consumes property-value responses matching
    /// the outstanding request; everything else goes to the user handler.
    pub async fn handle_message(&self, topic: &str, payload: &Value) -> bool {
        if topic == self.values_topic() && self.task_handle(payload) {
            return true;
        }
        match &self.handler {
            Some(handler) => handler.on_message(topic, payload).await,
            None => false,
        }
    }

    /// Add a raw subscription filter.
    ///
    /// # Errors
    ///
    /// Returns a transport error for an invalid filter.
    pub fn subscribe(&self, filter: &str) -> Result<(), IscError> {
        let filter = TopicFilter::parse(filter).map_err(BusError::Topic)?;
        self.filters.insert(filter);
        Ok(())
    }

    /// Publish a raw payload, stamping `ts`.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the publish.
    pub async fn publish(&self, topic: &str, mut payload: Payload) -> Result<(), IscError> {
        stamp(&mut payload);
        self.transport.publish(topic, Value::Object(payload)).await?;
        Ok(())
    }
}

/// Free the slot if the uid matches the occupant.
fn complete_slot(slot: &Mutex<TaskSlot>, uid: &str) {
    let Ok(mut slot) = slot.lock() else {
        return;
    };
    if slot.current.as_ref().is_some_and(|a| a.uid == uid) {
        if let Some(mut active) = slot.current.take() {
            if let Some(watchdog) = active.watchdog.take() {
                watchdog.abort();
            }
            debug!(uid = %active.uid, task_type = %active.task_type, "Task complete");
        }
    }
}

/// Expire the slot at the deadline.
///
/// An unanswered task fires its timeout callback once; a task that was
/// answered but never acknowledged is reclaimed silently so the next
/// request can proceed.
fn expire_slot(slot: &Mutex<TaskSlot>, uid: &str, tag: &str) {
    let expired = {
        let Ok(mut slot) = slot.lock() else {
            return;
        };
        match slot.current.as_ref() {
            Some(active) if active.uid == uid => slot.current.take(),
            _ => None,
        }
    };
    if let Some(mut active) = expired {
        if active.responded {
            warn!(tag, uid = %active.uid, task_type = %active.task_type, "Task never acknowledged; slot reclaimed");
            return;
        }
        warn!(tag, uid = %active.uid, task_type = %active.task_type, "Task timed out");
        if let Some(callback) = active.timeout_callback.take() {
            let meta = std::mem::take(&mut active.meta);
            callback(meta);
        }
    }
}

/// Merge confirmed values into the cache and warm store.
fn absorb_values(
    cache: &Mutex<PropertyCache>,
    store: &Mutex<Payload>,
    response: &Payload,
    all: bool,
) -> Payload {
    if let Some(errors) = response.get(ERRORS_KEY).and_then(Value::as_array) {
        if !errors.is_empty() {
            warn!(?errors, "Remote reported property errors");
        }
    }
    let properties = response
        .get(PROPERTIES_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Ok(mut cache) = cache.lock() {
        for (name, value) in &properties {
            cache.cache(name.clone(), value.clone());
        }
        if all {
            cache.cache(CACHE_ALL, Value::Bool(true));
        }
    }
    if let Ok(mut store) = store.lock() {
        for (name, value) in &properties {
            store.insert(name.clone(), value.clone());
        }
    }
    properties
}

/// Take and fire the init callback, if still armed.
fn fire_init(callback: &Mutex<Option<InitCallback>>, success: bool) {
    let taken = callback.lock().ok().and_then(|mut slot| slot.take());
    if let Some(callback) = taken {
        callback(success);
    }
}
