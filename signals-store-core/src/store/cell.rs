//! Field cells and selectors: the read side of a store.

use std::fmt;

use crate::reactive::{Memo, Signal, SubscriberId};

/// Observable holder of one state field.
///
/// A cell reads like a signal (tracked inside memos and effects) but has no
/// public setter: only the owning [`Store`](super::Store) writes it, and only
/// when the field actually changed. Clones are handles to the same cell.
pub struct FieldCell<V>
where
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    signal: Signal<V>,
}

impl<V> FieldCell<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, value: V) -> Self {
        Self {
            name,
            signal: Signal::new(value),
        }
    }

    /// The state field this cell mirrors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Source ID of the underlying signal.
    pub fn id(&self) -> u64 {
        self.signal.id()
    }

    /// Number of times the store has written this cell.
    pub fn version(&self) -> u64 {
        self.signal.version()
    }

    /// Current value; tracked inside memos and effects.
    pub fn get(&self) -> V {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> V {
        self.signal.get_untracked()
    }

    /// Borrow the current value; tracked inside memos and effects.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        self.signal.with(f)
    }

    /// Run `notify` after every write to this cell.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.signal.subscribe(id, notify);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.signal.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.signal.subscriber_count()
    }

    pub(crate) fn set(&self, value: V) {
        self.signal.set(value);
    }
}

impl<V> Clone for FieldCell<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            signal: self.signal.clone(),
        }
    }
}

impl<V> fmt::Debug for FieldCell<V>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCell")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// Derived value computed from a store's cells.
///
/// Recomputes lazily: the first read after a referenced cell changed runs
/// the selector again, every other read returns the cached value.
pub struct Selector<R>
where
    R: Clone + Send + Sync + PartialEq + 'static,
{
    memo: Memo<R>,
}

impl<R> Selector<R>
where
    R: Clone + Send + Sync + PartialEq + 'static,
{
    pub(crate) fn new<F>(compute: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            memo: Memo::new(compute),
        }
    }

    pub fn get(&self) -> R {
        self.memo.get()
    }

    /// The memo backing this selector.
    pub fn as_memo(&self) -> &Memo<R> {
        &self.memo
    }
}

impl<R> Clone for Selector<R>
where
    R: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            memo: self.memo.clone(),
        }
    }
}

impl<R> fmt::Debug for Selector<R>
where
    R: Clone + Send + Sync + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.memo).finish()
    }
}
