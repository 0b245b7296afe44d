//! The state store.
//!
//! Every mutation goes through the same pipeline:
//!
//! 1. Build the next state from a clone of the current one (draft, typed
//!    patch, or dynamic patch).
//! 2. Diff it field by field against the current state.
//! 3. Nothing changed: stop. No cell is written and nothing is persisted.
//! 4. Otherwise commit it, write exactly the changed cells inside one
//!    reactive batch, and restart the persistence timer.

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use serde_json::{Map, Value};

use super::cell::Selector;
use super::config::StoreConfig;
use super::persist::{Debouncer, PersistenceSlot};
use super::state::{ChangeSet, StoreState};
use crate::error::{Result, StoreError};
use crate::reactive::Runtime;
use crate::storage::SharedStorage;

struct StoreInner<T: StoreState> {
    /// Serializes mutations. Reentrant, so effects fired by a commit and
    /// updaters themselves may call back into the store.
    writer: ReentrantMutex<()>,
    /// Bumped by every commit that changed something.
    revision: AtomicU64,
    source: RwLock<T>,
    cells: T::Cells,
    slot: Option<PersistenceSlot>,
    debouncer: Debouncer,
}

impl<T: StoreState> StoreInner<T> {
    fn persist(&self) {
        let Some(slot) = &self.slot else {
            return;
        };

        let result = slot.save(&*self.source.read());
        match result {
            Ok(()) => tracing::debug!(storage_key = slot.key(), "state persisted"),
            Err(err) => {
                tracing::warn!(storage_key = slot.key(), error = %err, "failed to persist state")
            }
        }
    }
}

/// Reactive store over a [`StoreState`].
///
/// Applications wrap a `Store` in their own type, keep it private, and expose
/// named actions that call [`set`](Store::set) or [`patch`](Store::patch).
/// Readers go through [`state`](Store::state) and [`select`](Store::select).
///
/// Clones are handles to the same store.
pub struct Store<T: StoreState> {
    inner: Arc<StoreInner<T>>,
}

impl<T: StoreState> Store<T> {
    /// In-memory store without persistence.
    pub fn new(initial: T) -> Self {
        Self::build(initial, None, &StoreConfig::default())
    }

    /// Store persisted under `ng_store_<storage_key>` with default config.
    pub fn persisted(initial: T, storage_key: &str, storage: SharedStorage) -> Self {
        Self::with_config(initial, Some(storage_key), storage, &StoreConfig::default())
    }

    /// Store with an explicit config. `storage_key: None` disables persistence.
    pub fn with_config(
        initial: T,
        storage_key: Option<&str>,
        storage: SharedStorage,
        config: &StoreConfig,
    ) -> Self {
        let slot = storage_key.map(|key| PersistenceSlot::new(config.slot_key(key), storage));
        Self::build(initial, slot, config)
    }

    fn build(initial: T, slot: Option<PersistenceSlot>, config: &StoreConfig) -> Self {
        let state = match &slot {
            Some(slot) => restore(initial, slot),
            None => initial,
        };
        let cells = state.create_cells();

        Self {
            inner: Arc::new(StoreInner {
                writer: ReentrantMutex::new(()),
                revision: AtomicU64::new(0),
                source: RwLock::new(state),
                cells,
                slot,
                debouncer: Debouncer::new(config.debounce()),
            }),
        }
    }

    /// One observable cell per state field.
    pub fn state(&self) -> &T::Cells {
        &self.inner.cells
    }

    /// Clone of the current flat state.
    pub fn snapshot(&self) -> T {
        self.inner.source.read().clone()
    }

    /// Full persistence key, when persistence is enabled.
    pub fn storage_key(&self) -> Option<&str> {
        self.inner.slot.as_ref().map(PersistenceSlot::key)
    }

    /// Whether a debounced write is waiting.
    pub fn has_pending_write(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Derived value over the cells, recomputed lazily after they change.
    pub fn select<R, F>(&self, selector: F) -> Selector<R>
    where
        R: Clone + Send + Sync + PartialEq + 'static,
        F: Fn(&T::Cells) -> R + Send + Sync + 'static,
    {
        let cells = self.inner.cells.clone();
        Selector::new(move || selector(&cells))
    }

    /// Mutate a draft of the whole state.
    ///
    /// Edit `Arc` fields with `Arc::make_mut` so only they get new identities.
    /// If the updater panics the draft is discarded, the panic is logged, and
    /// the store is left exactly as it was.
    ///
    /// An updater may itself update the store. The nested update commits
    /// first; the fields the outer draft edited are then applied on top of it.
    pub fn set<F>(&self, updater: F) -> ChangeSet
    where
        F: FnOnce(&mut T),
    {
        let _writer = self.inner.writer.lock();
        let (base, seen) = self.begin();
        let mut draft = base.clone();

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| updater(&mut draft))) {
            tracing::error!(
                state = type_name::<T>(),
                reason = panic_message(&*payload),
                "state updater panicked; update discarded"
            );
            return ChangeSet::new();
        }

        self.finish(base, draft, seen)
    }

    /// Like [`set`](Store::set) with a fallible updater. An `Err` is logged
    /// and the draft discarded.
    pub fn try_set<F, E>(&self, updater: F) -> ChangeSet
    where
        F: FnOnce(&mut T) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        let mut failure = None;
        let changes = self.set(|draft| {
            if let Err(err) = updater(draft) {
                failure = Some(err.to_string());
            }
        });

        match failure {
            Some(reason) => {
                tracing::error!(state = type_name::<T>(), %reason, "state updater failed; update discarded");
                ChangeSet::new()
            }
            None => changes,
        }
    }

    /// Overwrite the fields set in the returned partial.
    pub fn patch<F>(&self, updater: F) -> ChangeSet
    where
        F: FnOnce(&T) -> T::Patch,
    {
        let _writer = self.inner.writer.lock();
        let (base, seen) = self.begin();
        let patch = updater(&base);
        let mut draft = base.clone();
        draft.apply_patch(patch);
        self.finish(base, draft, seen)
    }

    /// Overwrite fields named by the keys of the returned JSON object.
    ///
    /// Every key must be a declared field, otherwise the call fails with
    /// [`StoreError::UnknownField`] and nothing is applied. Values are
    /// decoded into the field's type; a value that does not fit fails with
    /// [`StoreError::InvalidField`], again applying nothing.
    pub fn patch_fields<F>(&self, updater: F) -> Result<ChangeSet>
    where
        F: FnOnce(&T) -> Map<String, Value>,
    {
        let _writer = self.inner.writer.lock();
        let (base, seen) = self.begin();
        let fields = updater(&base);

        if let Some(field) = fields.keys().find(|field| !T::has_field(field)) {
            return Err(StoreError::UnknownField {
                field: field.clone(),
            });
        }

        let mut draft = base.clone();
        for (field, value) in fields {
            draft.apply_field(&field, value)?;
        }

        Ok(self.finish(base, draft, seen))
    }

    /// Remove the persisted entry and drop any pending write.
    /// In-memory state is untouched.
    pub fn clear_cache(&self) {
        let Some(slot) = &self.inner.slot else {
            return;
        };

        self.inner.debouncer.cancel();
        match slot.clear() {
            Ok(()) => tracing::debug!(storage_key = slot.key(), "persisted state cleared"),
            Err(err) => {
                tracing::warn!(storage_key = slot.key(), error = %err, "failed to clear persisted state")
            }
        }
    }

    /// Write the current state now instead of waiting for the timer.
    pub fn flush(&self) {
        self.inner.debouncer.cancel();
        self.inner.persist();
    }

    /// Snapshot the state together with the revision it belongs to.
    fn begin(&self) -> (T, u64) {
        let source = self.inner.source.read();
        (source.clone(), self.inner.revision.load(Ordering::Acquire))
    }

    /// Commit `draft`, rebasing it first when a nested update committed
    /// after `base` was taken.
    fn finish(&self, base: T, draft: T, seen: u64) -> ChangeSet {
        if self.inner.revision.load(Ordering::Acquire) == seen {
            return self.commit(draft);
        }

        let edits = base.diff(&draft);
        tracing::debug!(
            state = type_name::<T>(),
            edited = ?edits.fields(),
            "state moved during update; rebasing draft"
        );
        let mut next = self.snapshot();
        next.merge_fields(&draft, &edits);
        self.commit(next)
    }

    fn commit(&self, next: T) -> ChangeSet {
        let (changes, committed) = {
            let mut source = self.inner.source.write();
            let changes = source.diff(&next);
            if changes.is_empty() {
                tracing::trace!(state = type_name::<T>(), "update changed nothing");
                return changes;
            }
            *source = next;
            self.inner.revision.fetch_add(1, Ordering::AcqRel);
            (changes, source.clone())
        };

        tracing::debug!(state = type_name::<T>(), changed = ?changes.fields(), "state updated");
        Runtime::batch(|| committed.publish(&self.inner.cells, &changes));
        self.schedule_persist();
        changes
    }

    fn schedule_persist(&self) {
        if self.inner.slot.is_none() {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(move || {
            // A store dropped before the window closed has nothing to write.
            if let Some(inner) = inner.upgrade() {
                inner.persist();
            }
        });
    }
}

impl<T: StoreState> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StoreState + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.source.read())
            .field("storage_key", &self.storage_key())
            .field("pending_write", &self.has_pending_write())
            .finish()
    }
}

/// Merge the persisted blob over `initial`, field by field.
fn restore<T: StoreState>(initial: T, slot: &PersistenceSlot) -> T {
    let Some(persisted) = slot.load() else {
        return initial;
    };

    let mut state = initial;
    let mut carried = Map::new();
    for (field, value) in persisted {
        if !T::has_field(&field) {
            carried.insert(field, value);
            continue;
        }
        if let Err(err) = state.apply_field(&field, value) {
            tracing::warn!(
                storage_key = slot.key(),
                field = %field,
                error = %err,
                "persisted value does not fit; keeping the initial value"
            );
        }
    }

    if !carried.is_empty() {
        tracing::debug!(
            storage_key = slot.key(),
            keys = ?carried.keys().collect::<Vec<_>>(),
            "carrying persisted keys the state does not declare"
        );
        slot.carry(carried);
    }

    tracing::debug!(storage_key = slot.key(), "restored persisted state");
    state
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
