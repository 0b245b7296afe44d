//! Signals Store Core
//!
//! Application state containers with per-field reactivity and optional
//! persistence.
//!
//! - Reactive primitives (signals, memos, effects) with automatic dependency
//!   tracking
//! - Stores that mirror each state field into its own cell and write a cell
//!   only when its field changed
//! - Debounced persistence to a pluggable key-value backend
//! - A singleton container that hands out stores together with their cells
//!
//! # Architecture
//!
//! - `reactive`: signals, memos, effects and the runtime that links them
//! - `store`: state declaration, per-field diffing, and persistence
//! - `storage`: key-value backends (in-memory, one file per key)
//! - `inject`: the singleton container and store accessors
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use signals_store_core::inject::{resolve_one, Container, Injectable, SignalStore};
//! use signals_store_core::store::Store;
//! use signals_store_core::{store_state, Result};
//!
//! store_state! {
//!     #[derive(Debug, Clone, Serialize, Deserialize)]
//!     pub struct SessionState {
//!         pub token: Option<String>,
//!         pub loading: bool,
//!     }
//!     pub struct SessionCells;
//!     pub struct SessionPatch;
//! }
//!
//! pub struct SessionStore {
//!     store: Store<SessionState>,
//! }
//!
//! impl SessionStore {
//!     pub fn set_loading(&self, loading: bool) {
//!         self.store.set(|draft| draft.loading = loading);
//!     }
//! }
//!
//! impl Injectable for SessionStore {
//!     fn inject(_container: &Container) -> Result<Self> {
//!         Ok(Self {
//!             store: Store::new(SessionState { token: None, loading: false }),
//!         })
//!     }
//! }
//!
//! impl SignalStore for SessionStore {
//!     type State = SessionState;
//!
//!     fn store(&self) -> &Store<SessionState> {
//!         &self.store
//!     }
//! }
//!
//! let container = Container::new();
//! let session = resolve_one::<SessionStore>(&container)?;
//! session.set_loading(true);
//! assert!(session.fields().loading.get());
//! assert_eq!(session.fields().token.version(), 0);
//! # Ok::<(), signals_store_core::StoreError>(())
//! ```

pub mod inject;
pub mod reactive;
pub mod storage;
pub mod store;

mod error;

pub use error::{Result, StoreError};
pub use inject::{resolve_many, resolve_one, Accessed, Container, Injectable, SignalStore};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, SharedStorage};
pub use store::{Store, StoreConfig, StoreState};

/// Items used by the exported macros. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use serde_json;

    use crate::store::FieldCell;

    pub fn publish<V>(cell: &FieldCell<V>, value: V)
    where
        V: Clone + Send + Sync + 'static,
    {
        cell.set(value);
    }
}
