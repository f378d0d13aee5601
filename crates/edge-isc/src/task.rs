//! # ISC Tasks
//!
//! A task represents an outstanding inter-service request awaiting a
//! response, carrying callbacks and a lifetime after which it expires.
//!
//! [`TaskQueue`] is the router's order-independent queue; entries not
//! retrieved within their lifetime are purged by `remove_expired`,
//! invoking their timeout callback. The proxy's dedicated single-slot
//! queue lives with the proxy.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::IscError;

/// Default task lifetime before expiry.
pub const DEFAULT_TASK_LIFETIME: Duration = Duration::from_secs(10);

/// Metadata passed through to task callbacks.
pub type TaskMeta = Map<String, Value>;

/// Completion callback: receives the response payload and task metadata.
pub type TaskCallback = Box<dyn FnOnce(Value, TaskMeta) + Send>;

/// Timeout callback: receives the task metadata.
pub type TimeoutCallback = Box<dyn FnOnce(TaskMeta) + Send>;

/// Metadata key carrying the task uid when callbacks fire.
pub const META_TASK_ID: &str = "task_id";

/// Metadata key carrying the task type when callbacks fire.
pub const META_TASK_TYPE: &str = "task_type";

/// An inter-service request awaiting a response.
pub struct IscTask {
    /// Unique request identifier, echoed by the responder.
    pub uid: String,
    /// Short name for the task purpose.
    pub task_type: String,
    /// Time before the task expires; `None` means it never does.
    pub lifetime: Option<Duration>,
    /// Metadata handed to callbacks.
    pub meta: TaskMeta,
    /// Invoked with the matching response.
    pub callback: Option<TaskCallback>,
    /// Invoked if the lifetime elapses first.
    pub timeout_callback: Option<TimeoutCallback>,
    queued: Instant,
}

impl IscTask {
    /// Create a task with a fresh UUIDv4 uid and the default lifetime.
    #[must_use]
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            lifetime: Some(DEFAULT_TASK_LIFETIME),
            meta: TaskMeta::new(),
            callback: None,
            timeout_callback: None,
            queued: Instant::now(),
        }
    }

    /// Use an explicit uid instead of a generated one.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Override the lifetime; `None` disables expiry.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Attach metadata handed to callbacks.
    #[must_use]
    pub fn with_meta(mut self, meta: TaskMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Attach the completion callback.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce(Value, TaskMeta) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Attach the timeout callback.
    #[must_use]
    pub fn on_timeout(mut self, callback: impl FnOnce(TaskMeta) + Send + 'static) -> Self {
        self.timeout_callback = Some(Box::new(callback));
        self
    }

    /// When the task was queued.
    #[must_use]
    pub fn queued_at(&self) -> Instant {
        self.queued
    }

    /// True if the lifetime has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.lifetime {
            Some(lifetime) => self.queued.elapsed() > lifetime,
            None => false,
        }
    }

    /// Metadata augmented with the task uid and type, as callbacks see it.
    #[must_use]
    pub fn callback_meta(&self) -> TaskMeta {
        let mut meta = self.meta.clone();
        meta.insert(META_TASK_ID.to_string(), Value::from(self.uid.clone()));
        meta.insert(
            META_TASK_TYPE.to_string(),
            Value::from(self.task_type.clone()),
        );
        meta
    }
}

impl fmt::Debug for IscTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IscTask")
            .field("uid", &self.uid)
            .field("task_type", &self.task_type)
            .field("lifetime", &self.lifetime)
            .field("has_callback", &self.callback.is_some())
            .field("has_timeout_callback", &self.timeout_callback.is_some())
            .finish()
    }
}

/// Order-independent queue of outstanding tasks.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Vec<IscTask>,
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateTask`] if a task with the same uid
    /// is already queued.
    pub fn add(&mut self, task: IscTask) -> Result<(), IscError> {
        if self.is_queued(&task.uid) {
            return Err(IscError::DuplicateTask { uid: task.uid });
        }
        self.tasks.push(task);
        Ok(())
    }

    /// True if a task with this uid is queued.
    #[must_use]
    pub fn is_queued(&self, uid: &str) -> bool {
        self.tasks.iter().any(|t| t.uid == uid)
    }

    /// True if any queued task carries this metadata key/value pair.
    #[must_use]
    pub fn is_queued_meta(&self, key: &str, value: &Value) -> bool {
        self.tasks.iter().any(|t| t.meta.get(key) == Some(value))
    }

    /// Retrieve (and remove) the task with this uid.
    #[must_use]
    pub fn get(&mut self, uid: &str) -> Option<IscTask> {
        let index = self.tasks.iter().position(|t| t.uid == uid)?;
        Some(self.tasks.remove(index))
    }

    /// Remove expired tasks, firing their timeout callbacks.
    ///
    /// Should be called regularly by the owner, for example every
    /// second.
    pub fn remove_expired(&mut self) {
        let mut index = 0;
        while index < self.tasks.len() {
            if !self.tasks[index].is_expired() {
                index += 1;
                continue;
            }
            let mut expired = self.tasks.remove(index);
            warn!(uid = %expired.uid, task_type = %expired.task_type, "Removing expired task");
            let meta = expired.callback_meta();
            if let Some(timeout_callback) = expired.timeout_callback.take() {
                timeout_callback(meta);
            }
        }
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop all tasks without firing callbacks.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

/// Cloneable handle to a shared [`TaskQueue`].
///
/// The router holds one and hands clones to features that issue their
/// own outbound requests.
#[derive(Clone, Default)]
pub struct TaskQueueHandle {
    inner: Arc<Mutex<TaskQueue>>,
}

impl TaskQueueHandle {
    /// Create a handle over an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateTask`] for a duplicate uid.
    pub fn add(&self, task: IscTask) -> Result<(), IscError> {
        let Ok(mut queue) = self.inner.lock() else {
            return Err(IscError::DuplicateTask { uid: task.uid });
        };
        queue.add(task)
    }

    /// Retrieve (and remove) a task by uid.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<IscTask> {
        self.inner.lock().ok().and_then(|mut queue| queue.get(uid))
    }

    /// True if a task with this uid is queued.
    #[must_use]
    pub fn is_queued(&self, uid: &str) -> bool {
        self.inner.lock().is_ok_and(|queue| queue.is_queued(uid))
    }

    /// True if any queued task carries this metadata key/value pair.
    #[must_use]
    pub fn is_queued_meta(&self, key: &str, value: &Value) -> bool {
        self.inner
            .lock()
            .is_ok_and(|queue| queue.is_queued_meta(key, value))
    }

    /// Remove expired tasks, firing their timeout callbacks.
    pub fn remove_expired(&self) {
        if let Ok(mut queue) = self.inner.lock() {
            queue.remove_expired();
        }
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |queue| queue.len())
    }

    /// True if no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
