//! Dependency injection for stores.
//!
//! Stores are application-wide singletons. A [`Container`] builds each
//! [`Injectable`] type once; [`resolve_one`] and [`resolve_many`] pair the
//! resulting store with its field cells.

mod accessor;
mod container;

pub use accessor::{resolve_many, resolve_one, Accessed, SignalStore, StoreSet};
pub use container::{Container, Injectable};
