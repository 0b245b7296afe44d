//! Accessors that hand out a store's actions and its field cells together.
//!
//! An application store wraps a [`Store`] and exposes named actions. It
//! implements [`SignalStore`] to say which `Store` it wraps and
//! [`Injectable`] so the container can build it.
//!
//! [`resolve_one`] returns an [`Accessed`] view: it derefs to the store, so
//! actions are called directly, and [`Accessed::fields`] gives the cells.
//! [`resolve_many`] does the same for several stores at once, either as a
//! tuple of store types or as a named struct declared with
//! [`store_set!`](crate::store_set).

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::container::{Container, Injectable};
use crate::error::Result;
use crate::store::{Store, StoreState};

/// An injectable wrapper around one [`Store`].
pub trait SignalStore: Injectable {
    type State: StoreState;

    fn store(&self) -> &Store<Self::State>;

    fn state(&self) -> &<Self::State as StoreState>::Cells {
        self.store().state()
    }

    /// Remove the persisted entry of the wrapped store.
    fn clear_cache(&self) {
        self.store().clear_cache()
    }
}

/// A resolved store together with its field cells.
pub struct Accessed<S: SignalStore> {
    instance: Arc<S>,
    fields: <S::State as StoreState>::Cells,
}

impl<S: SignalStore> Accessed<S> {
    pub fn instance(&self) -> &Arc<S> {
        &self.instance
    }

    pub fn fields(&self) -> &<S::State as StoreState>::Cells {
        &self.fields
    }

    pub fn into_parts(self) -> (Arc<S>, <S::State as StoreState>::Cells) {
        (self.instance, self.fields)
    }
}

impl<S: SignalStore> Deref for Accessed<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.instance
    }
}

impl<S: SignalStore> Clone for Accessed<S> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            fields: self.fields.clone(),
        }
    }
}

impl<S: SignalStore> fmt::Debug for Accessed<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessed")
            .field("store", &std::any::type_name::<S>())
            .field("fields", &<S::State as StoreState>::FIELDS)
            .finish()
    }
}

/// Resolve the singleton of `S` and pair it with its cells.
pub fn resolve_one<S: SignalStore>(container: &Container) -> Result<Accessed<S>> {
    let instance = container.resolve::<S>()?;
    let fields = instance.state().clone();
    Ok(Accessed { instance, fields })
}

/// A group of stores resolved together.
pub trait StoreSet {
    type Output;

    fn resolve_all(container: &Container) -> Result<Self::Output>;
}

/// Resolve every store of `Set`.
///
/// `Set` is either a tuple of store types, yielding a tuple of
/// [`Accessed`], or a struct declared with [`store_set!`](crate::store_set).
pub fn resolve_many<Set: StoreSet>(container: &Container) -> Result<Set::Output> {
    Set::resolve_all(container)
}

macro_rules! tuple_store_set {
    ($($store:ident),+) => {
        impl<$($store: SignalStore),+> StoreSet for ($($store,)+) {
            type Output = ($(Accessed<$store>,)+);

            fn resolve_all(container: &Container) -> Result<Self::Output> {
                Ok(($(resolve_one::<$store>(container)?,)+))
            }
        }
    };
}

tuple_store_set!(A);
tuple_store_set!(A, B);
tuple_store_set!(A, B, C);
tuple_store_set!(A, B, C, D);
tuple_store_set!(A, B, C, D, E);
tuple_store_set!(A, B, C, D, E, F);

/// Declare a named set of stores for [`resolve_many`].
///
/// ```rust,ignore
/// store_set! {
///     pub struct Stores {
///         pub app: AppStore,
///         pub cart: CartStore,
///     }
/// }
///
/// let stores = resolve_many::<Stores>(&container)?;
/// stores.app.set_loading(true);
/// let loading = stores.app.fields().loading.get();
/// ```
#[macro_export]
macro_rules! store_set {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $store:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $crate::inject::Accessed<$store>,
            )*
        }

        impl $crate::inject::StoreSet for $name {
            type Output = Self;

            fn resolve_all(container: &$crate::inject::Container) -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    $(
                        $field: $crate::inject::resolve_one::<$store>(container)?,
                    )*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    crate::store_state! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct CounterState {
            count: u32,
        }
        struct CounterCells;
        struct CounterPatch;
    }

    crate::store_state! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct FlagState {
            enabled: bool,
        }
        struct FlagCells;
        struct FlagPatch;
    }

    struct CounterStore {
        store: Store<CounterState>,
    }

    impl CounterStore {
        fn increment(&self) {
            self.store.set(|draft| draft.count += 1);
        }
    }

    impl Injectable for CounterStore {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Self {
                store: Store::new(CounterState { count: 0 }),
            })
        }
    }

    impl SignalStore for CounterStore {
        type State = CounterState;

        fn store(&self) -> &Store<CounterState> {
            &self.store
        }
    }

    struct FlagStore {
        store: Store<FlagState>,
    }

    impl Injectable for FlagStore {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Self {
                store: Store::new(FlagState { enabled: false }),
            })
        }
    }

    impl SignalStore for FlagStore {
        type State = FlagState;

        fn store(&self) -> &Store<FlagState> {
            &self.store
        }
    }

    crate::store_set! {
        struct Stores {
            counter: CounterStore,
            flag: FlagStore,
        }
    }

    #[test]
    fn accessed_exposes_actions_and_fields() {
        let container = Container::new();
        let counter = resolve_one::<CounterStore>(&container).unwrap();

        counter.increment();
        assert_eq!(counter.fields().count.get(), 1);
        assert_eq!(counter.state().count.get(), 1);
    }

    #[test]
    fn repeated_resolution_shares_the_singleton() {
        let container = Container::new();
        let first = resolve_one::<CounterStore>(&container).unwrap();
        let second = resolve_one::<CounterStore>(&container).unwrap();

        first.increment();
        assert!(Arc::ptr_eq(first.instance(), second.instance()));
        assert_eq!(second.fields().count.get(), 1);
    }

    #[test]
    fn tuples_resolve_each_store() {
        let container = Container::new();
        let (counter, flag) = resolve_many::<(CounterStore, FlagStore)>(&container).unwrap();

        counter.increment();
        flag.store().set(|draft| draft.enabled = true);

        assert_eq!(counter.fields().count.get(), 1);
        assert!(flag.fields().enabled.get());
    }

    #[test]
    fn named_sets_resolve_by_field() {
        let container = Container::new();
        let stores = resolve_many::<Stores>(&container).unwrap();
        let (counter,) = resolve_many::<(CounterStore,)>(&container).unwrap();

        stores.counter.increment();
        assert_eq!(counter.fields().count.get(), 1);
        assert!(!stores.flag.fields().enabled.get());
    }
}
