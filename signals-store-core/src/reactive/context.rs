//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or memo is read,
//! it registers itself with the current computation.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it.
//!
//! Each read records a [`Dependency`]: the source that was read and the
//! version it had at that moment. A memo later compares those recorded
//! versions with the live ones to decide whether it must recompute.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo).

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::SubscriberId;

/// Counter shared by every reactive source (signals and memos), so a source
/// ID is unique across both kinds.
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique source ID.
pub(crate) fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A readable reactive value that carries a version number.
///
/// The version moves every time the observable value changes.
pub trait Source: Send + Sync {
    /// The unique ID of this source.
    fn source_id(&self) -> u64;

    /// The current version.
    ///
    /// Derived sources bring themselves up to date before answering.
    fn version(&self) -> u64;
}

/// A source read during a computation, with the version observed at read time.
#[derive(Clone)]
pub struct Dependency {
    source: Arc<dyn Source>,
    observed: u64,
}

impl Dependency {
    /// Get the ID of the source that was read.
    pub fn id(&self) -> u64 {
        self.source.source_id()
    }

    /// Whether the source moved since it was read.
    pub fn is_stale(&self) -> bool {
        self.source.version() != self.observed
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id())
            .field("observed", &self.observed)
            .finish()
    }
}

thread_local! {
    /// Each thread has its own stack to track which computation is running.
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The subscriber ID of the current computation.
    subscriber_id: SubscriberId,
    /// Sources read during this computation, deduplicated by ID.
    dependencies: Vec<Dependency>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the context stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any source that is read registers
    /// itself as a dependency of the subscriber.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: Vec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Record a read of `source` at version `observed`.
    ///
    /// Repeated reads of the same source keep the first observation.
    pub fn track(source: Arc<dyn Source>, observed: u64) {
        let id = source.source_id();
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.dependencies.iter().all(|dep| dep.id() != id) {
                    entry.dependencies.push(Dependency { source, observed });
                }
            }
        });
    }

    /// Get the IDs of the sources read so far in the current context.
    pub fn dependency_ids() -> Vec<u64> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().map(Dependency::id).collect())
                .unwrap_or_default()
        })
    }

    /// Take the dependencies collected in the current context.
    pub fn take_dependencies() -> Vec<Dependency> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        id: u64,
        version: AtomicU64,
    }

    impl FixedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: next_source_id(),
                version: AtomicU64::new(0),
            })
        }
    }

    impl Source for FixedSource {
        fn source_id(&self) -> u64 {
            self.id
        }

        fn version(&self) -> u64 {
            self.version.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_deduplicates_dependencies() {
        let a = FixedSource::new();
        let b = FixedSource::new();
        let _ctx = ReactiveContext::enter(SubscriberId::new());

        ReactiveContext::track(a.clone(), 0);
        ReactiveContext::track(b.clone(), 0);
        ReactiveContext::track(a.clone(), 0);

        assert_eq!(ReactiveContext::dependency_ids(), vec![a.id, b.id]);
    }

    #[test]
    fn dependency_goes_stale_when_version_moves() {
        let source = FixedSource::new();
        let _ctx = ReactiveContext::enter(SubscriberId::new());
        ReactiveContext::track(source.clone(), 0);

        let deps = ReactiveContext::take_dependencies();
        assert_eq!(deps.len(), 1);
        assert!(!deps[0].is_stale());

        source.version.store(1, Ordering::SeqCst);
        assert!(deps[0].is_stale());
        assert!(ReactiveContext::dependency_ids().is_empty());
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }
}
