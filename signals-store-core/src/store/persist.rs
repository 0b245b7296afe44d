//! Persistence plumbing: the namespaced slot and the debounce timer.

use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::{Result, StoreError};
use crate::storage::{KeyValueStorage, SharedStorage};

/// How a [`Debouncer::schedule`] call was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// A timer is running; the task fires after the quiet window.
    Deferred,
    /// No timer could be started at all; the task already ran.
    Immediate,
}

/// Timer runtime for callers outside any tokio runtime.
///
/// Started on first use with a single worker and never shut down.
fn fallback_timer() -> Option<Handle> {
    static FALLBACK: OnceLock<Option<Runtime>> = OnceLock::new();

    FALLBACK
        .get_or_init(|| {
            match Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("signal-store-persist")
                .enable_time()
                .build()
            {
                Ok(runtime) => {
                    tracing::debug!("started background runtime for persistence timers");
                    Some(runtime)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "cannot start persistence timer runtime; writing through");
                    None
                }
            }
        })
        .as_ref()
        .map(|runtime| runtime.handle().clone())
}

/// Owned single-shot timer that coalesces bursts into one trailing run.
///
/// Every `schedule` aborts the pending run and starts a fresh window, so only
/// the last task of a burst executes. Dropping the debouncer cancels the
/// pending run.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `task` once the window has passed without another `schedule`.
    ///
    /// The timer runs on the ambient tokio runtime, or on a shared background
    /// runtime when the caller is outside one. Only if that runtime cannot be
    /// started does the task run immediately.
    pub fn schedule<F>(&self, task: F) -> Scheduled
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        match Handle::try_current().ok().or_else(fallback_timer) {
            Some(runtime) => {
                let window = self.window;
                *pending = Some(runtime.spawn(async move {
                    tokio::time::sleep(window).await;
                    task();
                }));
                Scheduled::Deferred
            }
            None => {
                drop(pending);
                task();
                Scheduled::Immediate
            }
        }
    }

    /// Cancel the pending run. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Where a store's state lives in the key-value backend.
///
/// Besides the key, the slot remembers entries of the loaded blob that the
/// current state shape does not declare, and writes them back on every save
/// so they survive a round through an older or newer build.
pub struct PersistenceSlot {
    key: String,
    storage: SharedStorage,
    carried: Mutex<Map<String, Value>>,
}

impl PersistenceSlot {
    pub fn new(key: impl Into<String>, storage: SharedStorage) -> Self {
        Self {
            key: key.into(),
            storage,
            carried: Mutex::new(Map::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted blob as a JSON object.
    ///
    /// Backend failures and corrupt blobs are logged and read as "nothing
    /// persisted".
    pub fn load(&self) -> Option<Map<String, Value>> {
        let blob = match self.storage.get_item(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(storage_key = %self.key, error = %err, "failed to read persisted state");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&blob) {
            Ok(Value::Object(object)) => Some(object),
            Ok(other) => {
                tracing::warn!(
                    storage_key = %self.key,
                    kind = json_kind(&other),
                    "persisted state is not an object; ignoring it"
                );
                None
            }
            Err(err) => {
                tracing::warn!(storage_key = %self.key, error = %err, "persisted state is corrupt; ignoring it");
                None
            }
        }
    }

    /// Keep these entries and write them back on every save.
    pub fn carry(&self, entries: Map<String, Value>) {
        self.carried.lock().extend(entries);
    }

    /// Serialize `state` and store it under the slot key.
    pub fn save<T: Serialize>(&self, state: &T) -> Result<()> {
        let mut object = match serde_json::to_value(state).map_err(StoreError::Serialize)? {
            Value::Object(object) => object,
            other => {
                return Err(StoreError::Serialize(serde::ser::Error::custom(format!(
                    "state must serialize to an object, got {}",
                    json_kind(&other)
                ))))
            }
        };

        for (key, value) in self.carried.lock().iter() {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let blob = serde_json::to_string(&object).map_err(StoreError::Serialize)?;
        self.storage.set_item(&self.key, &blob)?;
        Ok(())
    }

    /// Remove the persisted entry, carried entries included.
    pub fn clear(&self) -> Result<()> {
        self.carried.lock().clear();
        self.storage.remove_item(&self.key)?;
        Ok(())
    }
}

impl std::fmt::Debug for PersistenceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSlot")
            .field("key", &self.key)
            .field("carried", &self.carried.lock().len())
            .finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
