//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It keeps the dependency edges and propagates invalidation when a
//! source changes.
//!
//! # How It Works
//!
//! 1. Memos and effects register with the runtime when they are created.
//!
//! 2. When a memo or effect reads a source, the runtime records the edge.
//!
//! 3. When a source's value changes, the runtime:
//!    a. Finds all dependent memos/effects
//!    b. Marks them as "maybe dirty" (memos forward this to their own dependents)
//!    c. Runs effects, or queues them while a batch is open
//!    d. Memos are lazy - they recompute on next access
//!
//! # Batching
//!
//! [`Runtime::batch`] defers effects until the outermost batch closes, so a
//! group of writes (for example every field a store update touched) reaches
//! each effect once.
//!
//! # Thread Safety
//!
//! The registry and the edge table are global concurrent maps. Batch state is
//! thread-local: a batch only defers effects triggered on its own thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);

    /// Schedule this reactive value for execution (effects only).
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The subscriber this handle keeps registered.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Registry of reactive values. Weak references so the runtime never keeps a
// memo or effect alive on its own.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static SOURCE_SUBSCRIBERS: OnceLock<DashMap<u64, HashSet<SubscriberId>>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn source_subscribers() -> &'static DashMap<u64, HashSet<SubscriberId>> {
    SOURCE_SUBSCRIBERS.get_or_init(DashMap::new)
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queued: Vec<Arc<dyn Reactive>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Closes one batch level; the outermost close runs the queued effects.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let queued = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth -= 1;
            if batch.depth == 0 {
                std::mem::take(&mut batch.queued)
            } else {
                Vec::new()
            }
        });

        // Don't run user code while unwinding.
        if std::thread::panicking() {
            return;
        }

        for effect in queued {
            effect.schedule();
        }
    }
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        registry().insert(id, Arc::downgrade(&reactive));
        ReactiveHandle { subscriber_id: id }
    }

    /// Unregister a reactive value and drop its edges.
    fn unregister(id: SubscriberId) {
        registry().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source_id: u64, subscriber_id: SubscriberId) {
        source_subscribers()
            .entry(source_id)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale edges.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        for mut subscribers in source_subscribers().iter_mut() {
            subscribers.remove(&subscriber_id);
        }
        source_subscribers().retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Number of memos/effects currently depending on a source.
    pub fn dependent_count(source_id: u64) -> usize {
        source_subscribers()
            .get(&source_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(source_id: u64) {
        let subscriber_ids: Vec<SubscriberId> = match source_subscribers().get(&source_id) {
            Some(subscribers) => subscribers.iter().copied().collect(),
            None => return,
        };

        // Resolve to live values without holding any map guard while calling
        // into them: marking a memo dirty re-enters this function.
        let reactives: Vec<Arc<dyn Reactive>> = subscriber_ids
            .iter()
            .filter_map(|id| registry().get(id).and_then(|weak| weak.upgrade()))
            .collect();

        let mut effects_to_run = Vec::new();
        for reactive in reactives {
            reactive.mark_maybe_dirty();
            if reactive.is_eager() {
                effects_to_run.push(reactive);
            }
        }

        if effects_to_run.is_empty() {
            return;
        }

        let deferred = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return false;
            }
            for effect in &effects_to_run {
                let id = effect.subscriber_id();
                if batch.queued.iter().all(|queued| queued.subscriber_id() != id) {
                    batch.queued.push(Arc::clone(effect));
                }
            }
            true
        });

        if !deferred {
            for effect in effects_to_run {
                effect.schedule();
            }
        }
    }

    /// Run `f` with effect execution deferred until the outermost batch ends.
    ///
    /// Each effect triggered inside the batch runs at most once afterwards.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        let _guard = BatchGuard;
        f()
    }

    /// Whether a batch is open on this thread.
    pub fn is_batching() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
