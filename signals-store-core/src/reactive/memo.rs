//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result,
//!    remembering the version of every source it read.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the runtime marks the memo "maybe dirty".
//!
//! 4. On next access, the memo compares the recorded versions with the live
//!    ones. If any moved, it recomputes; otherwise it marks itself clean and
//!    returns the cache.
//!
//! 5. The memo's own version only moves when the recomputed value differs
//!    from the cached one, so downstream memos skip work for equal results.
//!
//! # Thread Safety
//!
//! Memos are thread-safe. The computation runs without any of the memo's
//! locks held, so it may read other memos and signals freely.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::{next_source_id, Dependency, ReactiveContext, Source};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. Need to check.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

type Compute<T> = Box<dyn Fn() -> T + Send + Sync>;

struct MemoInner<T> {
    id: u64,
    subscriber_id: SubscriberId,
    compute: Compute<T>,
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
    version: AtomicU64,
    dependencies: RwLock<Vec<Dependency>>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Bring the cache up to date and return the value.
    fn refresh(&self) -> T {
        let state = *self.state.read();
        let stale = match state {
            MemoState::Clean => false,
            MemoState::MaybeDirty => self.has_stale_dependency(),
            MemoState::Dirty => true,
        };

        if !stale {
            if let Some(value) = self.value.read().clone() {
                if state != MemoState::Clean {
                    *self.state.write() = MemoState::Clean;
                }
                return value;
            }
        }

        self.recompute()
    }

    fn has_stale_dependency(&self) -> bool {
        // Checking a memo dependency may recompute it; don't hold our lock.
        let dependencies = self.dependencies.read().clone();
        dependencies.iter().any(Dependency::is_stale)
    }

    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.subscriber_id);

        let (new_value, dependencies) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            let value = (self.compute)();
            (value, ReactiveContext::take_dependencies())
        };

        *self.dependencies.write() = dependencies;

        let changed = {
            let mut cached = self.value.write();
            let changed = cached.as_ref() != Some(&new_value);
            *cached = Some(new_value.clone());
            changed
        };
        if changed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }

        *self.state.write() = MemoState::Clean;
        new_value
    }
}

impl<T> Source for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn source_id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.refresh();
        self.version.load(Ordering::Acquire)
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        let was_clean = {
            let mut state = self.state.write();
            let was_clean = *state == MemoState::Clean;
            if was_clean {
                *state = MemoState::MaybeDirty;
            }
            was_clean
        };

        // Effects reading this memo need to hear about it too.
        if was_clean {
            Runtime::notify_signal_change(self.id);
        }
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos return the same value even if inputs changed).
///
/// # Example
///
/// ```rust
/// use signals_store_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let doubled = Memo::new(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
    _handle: Arc<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: next_source_id(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            version: AtomicU64::new(0),
            dependencies: RwLock::new(Vec::new()),
        });
        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the memo's unique source ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a reactive context the memo registers as a dependency of the
    /// running computation.
    pub fn get(&self) -> T {
        let value = self.inner.refresh();

        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            let observed = self.inner.version.load(Ordering::Acquire);
            ReactiveContext::track(self.inner.clone(), observed);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }

        value
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Number of distinct sources read by the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}
