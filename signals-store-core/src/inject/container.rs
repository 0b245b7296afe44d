//! Singleton container.
//!
//! The container constructs each requested type at most once and hands out
//! shared `Arc`s afterwards. Construction goes through [`Injectable`], which
//! may resolve further dependencies from the same container.
//!
//! Resolution tracks the chain of types being constructed on the current
//! thread; asking for a type that is already on the chain fails with
//! [`StoreError::CircularDependency`] instead of recursing forever.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::storage::SharedStorage;
use crate::store::StoreConfig;

/// Maximum nesting of constructions on one thread.
const MAX_RESOLUTION_DEPTH: usize = 64;

/// A type the container knows how to construct.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(container: &Container) -> Result<Self>;
}

impl Injectable for StoreConfig {
    fn inject(_container: &Container) -> Result<Self> {
        Ok(StoreConfig::default())
    }
}

impl Injectable for SharedStorage {
    fn inject(_container: &Container) -> Result<Self> {
        Ok(SharedStorage::memory())
    }
}

thread_local! {
    /// Types under construction on this thread, in resolution order.
    static RESOLVING: RefCell<IndexMap<TypeId, &'static str>> = RefCell::new(IndexMap::new());
}

/// Pops the type off the resolution chain when construction ends.
struct ResolutionGuard {
    type_id: TypeId,
}

impl ResolutionGuard {
    fn enter<T: 'static>() -> Result<Self> {
        let type_id = TypeId::of::<T>();
        RESOLVING.with(|resolving| {
            let mut resolving = resolving.borrow_mut();

            if resolving.contains_key(&type_id) || resolving.len() >= MAX_RESOLUTION_DEPTH {
                let chain = resolving
                    .values()
                    .copied()
                    .chain(std::iter::once(type_name::<T>()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(StoreError::CircularDependency { chain });
            }

            resolving.insert(type_id, type_name::<T>());
            Ok(Self { type_id })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|resolving| {
            resolving.borrow_mut().shift_remove(&self.type_id);
        });
    }
}

/// Type-keyed singleton scope.
#[derive(Default)]
pub struct Container {
    instances: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made value, replacing any previous one of its type.
    pub fn provide<T: Any + Send + Sync>(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.instances.insert(TypeId::of::<T>(), value.clone());
        value
    }

    /// Look up an already constructed or provided value.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instances
            .get(&TypeId::of::<T>())
            .and_then(|value| value.value().clone().downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.instances.contains_key(&TypeId::of::<T>())
    }

    /// Number of values held by the container.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Return the singleton of `T`, constructing it on first request.
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        if let Some(existing) = self.get::<T>() {
            return Ok(existing);
        }

        let _guard = ResolutionGuard::enter::<T>()?;
        let constructed: Arc<dyn Any + Send + Sync> = Arc::new(T::inject(self)?);
        tracing::debug!(type_name = type_name::<T>(), "constructed singleton");

        // Construction ran without holding the map, so another thread may
        // have won the race; its instance is the one everybody keeps.
        let stored = self
            .instances
            .entry(TypeId::of::<T>())
            .or_insert(constructed)
            .value()
            .clone();

        stored.downcast::<T>().map_err(|_| StoreError::Injection {
            type_name: type_name::<T>(),
            reason: "container entry holds a different type".into(),
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct Clock {
        offset: i64,
    }

    impl Injectable for Clock {
        fn inject(_container: &Container) -> Result<Self> {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Self { offset: 0 })
        }
    }

    struct Scheduler {
        clock: Arc<Clock>,
    }

    impl Injectable for Scheduler {
        fn inject(container: &Container) -> Result<Self> {
            Ok(Self {
                clock: container.resolve()?,
            })
        }
    }

    struct Ping;
    struct Pong;

    impl Injectable for Ping {
        fn inject(container: &Container) -> Result<Self> {
            container.resolve::<Pong>()?;
            Ok(Ping)
        }
    }

    impl Injectable for Pong {
        fn inject(container: &Container) -> Result<Self> {
            container.resolve::<Ping>()?;
            Ok(Pong)
        }
    }

    struct Broken;

    impl Injectable for Broken {
        fn inject(_container: &Container) -> Result<Self> {
            Err(StoreError::Injection {
                type_name: type_name::<Self>(),
                reason: "no backend".into(),
            })
        }
    }

    #[test]
    fn resolves_singletons_with_dependencies() {
        let container = Container::new();
        let before = CONSTRUCTED.load(Ordering::SeqCst);

        let scheduler = container.resolve::<Scheduler>().unwrap();
        let again = container.resolve::<Scheduler>().unwrap();
        let clock = container.resolve::<Clock>().unwrap();

        assert!(Arc::ptr_eq(&scheduler, &again));
        assert!(Arc::ptr_eq(&scheduler.clock, &clock));
        assert_eq!(clock.offset, 0);
        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst) - before, 1);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn provided_values_win_over_construction() {
        let container = Container::new();
        container.provide(StoreConfig {
            debounce_ms: 5,
            ..StoreConfig::default()
        });

        assert_eq!(container.resolve::<StoreConfig>().unwrap().debounce_ms, 5);
        assert!(container.contains::<StoreConfig>());
        assert!(container.get::<SharedStorage>().is_none());
    }

    #[test]
    fn detects_cycles() {
        let container = Container::new();
        let err = container.resolve::<Ping>().err().unwrap();

        match err {
            StoreError::CircularDependency { chain } => {
                assert!(chain.contains("Ping -> "));
                assert!(chain.ends_with("Ping"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The chain is unwound after the failure.
        assert!(RESOLVING.with(|resolving| resolving.borrow().is_empty()));
        assert!(container.is_empty());
    }

    #[test]
    fn construction_errors_propagate_and_cache_nothing() {
        let container = Container::new();
        assert!(matches!(
            container.resolve::<Broken>(),
            Err(StoreError::Injection { .. })
        ));
        assert!(!container.contains::<Broken>());
    }
}
