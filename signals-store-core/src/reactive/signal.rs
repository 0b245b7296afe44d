//! Signal Implementation
//!
//! A signal owns one value and a version counter. A tracked read records
//! `(signal, version)` in the running computation; a write bumps the
//! version, runs the plain change callbacks, and asks the runtime to
//! invalidate every memo and effect that read the signal.
//!
//! The value sits behind a `RwLock`. Callbacks run with no lock held, so a
//! callback may read or write the signal it observes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::{next_source_id, ReactiveContext, Source};
use super::runtime::Runtime;
use super::SubscriberId;

type Notifier = Arc<dyn Fn() + Send + Sync>;

struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: u64,

    /// Bumped on every write.
    version: AtomicU64,

    /// The current value.
    value: RwLock<T>,

    /// Change callbacks keyed by subscriber.
    notifiers: RwLock<Vec<(SubscriberId, Notifier)>>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn source_id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same value.
///
/// # Example
///
/// ```rust
/// use signals_store_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_source_id(),
                version: AtomicU64::new(0),
                value: RwLock::new(value),
                notifiers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it. Tracked like [`get`].
    ///
    /// [`get`]: Signal::get
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::AcqRel);

        self.notify_subscribers();
        Runtime::notify_signal_change(self.inner.id);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.read());
        self.set(new_value);
    }

    /// Register a change callback for a subscriber.
    ///
    /// The callback runs after every write to this signal.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .notifiers
            .write()
            .push((subscriber_id, Arc::new(notify)));
    }

    /// Remove a subscriber's change callbacks.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .notifiers
            .write()
            .retain(|(id, _)| *id != subscriber_id);
    }

    /// Get the number of subscribers: change callbacks plus memos and
    /// effects that read this signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifiers.read().len() + Runtime::dependent_count(self.inner.id)
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            let observed = self.inner.version();
            ReactiveContext::track(self.inner.clone(), observed);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }
    }

    fn notify_subscribers(&self) {
        let notifiers: Vec<Notifier> = self
            .inner
            .notifiers
            .read()
            .iter()
            .map(|(_, notify)| Arc::clone(notify))
            .collect();

        for notify in notifiers {
            notify();
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("version", &self.version())
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn reads_follow_writes_and_updates() {
        let signal = Signal::new(1);
        assert_eq!(signal.get(), 1);

        signal.set(4);
        signal.update(|v| v * 10);
        assert_eq!(signal.get_untracked(), 40);
        assert_eq!(signal.with(|v| v + 2), 42);
    }

    #[test]
    fn version_moves_on_every_write() {
        let signal = Signal::new("a".to_string());
        assert_eq!(signal.version(), 0);

        // Equal values still count: the store decides what is a change.
        signal.set("b".to_string());
        signal.set("b".to_string());
        assert_eq!(signal.version(), 2);
    }

    #[test]
    fn change_callbacks_until_unsubscribed() {
        let signal = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));

        let subscriber_id = SubscriberId::new();
        let calls_clone = calls.clone();
        signal.subscribe(subscriber_id, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        signal.set(1);
        signal.set(2);
        signal.unsubscribe(subscriber_id);
        signal.set(3);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_read_the_signal_it_observes() {
        let signal = Signal::new(1);
        let seen = Arc::new(AtomicI32::new(0));

        let (reader, seen_clone) = (signal.clone(), seen.clone());
        signal.subscribe(SubscriberId::new(), move || {
            seen_clone.store(reader.get_untracked(), Ordering::SeqCst);
        });

        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn clones_are_handles_to_one_value() {
        let first = Signal::new(0);
        let second = first.clone();
        let other = Signal::new(0);

        second.set(9);
        assert_eq!(first.get(), 9);
        assert_eq!(first.version(), 1);
        assert_eq!(first.id(), second.id());
        assert_ne!(first.id(), other.id());
    }
}
