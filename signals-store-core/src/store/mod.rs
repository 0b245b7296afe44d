//! Signal Stores
//!
//! A store owns a flat state record and mirrors every field into its own
//! [`FieldCell`], so consumers observe single fields instead of the whole
//! state. Mutations are diffed per field: a cell is written only when its
//! field changed, which keeps unrelated memos and effects quiet.
//!
//! # Declaring state
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use signals_store_core::store::Store;
//! use signals_store_core::store_state;
//!
//! store_state! {
//!     #[derive(Debug, Clone, Serialize, Deserialize)]
//!     pub struct TodoState {
//!         pub items: Arc<Vec<String>>,
//!         pub filter: String,
//!     }
//!     pub struct TodoCells;
//!     pub struct TodoPatch;
//! }
//!
//! let store = Store::new(TodoState {
//!     items: Arc::new(vec![]),
//!     filter: "all".into(),
//! });
//! let count = store.select(|cells| cells.items.with(|items| items.len()));
//!
//! store.set(|draft| Arc::make_mut(&mut draft.items).push("write docs".into()));
//! assert_eq!(count.get(), 1);
//! assert_eq!(store.state().filter.version(), 0);
//! ```
//!
//! # Persistence
//!
//! A store built with a storage key loads `<prefix>_<key>` on construction,
//! merges it over the initial state, and writes the full state back a quiet
//! window after the last change. See [`persist`] for the moving parts.

mod cell;
mod config;
pub mod persist;
mod state;
#[allow(clippy::module_inception)]
mod store;

pub use cell::{FieldCell, Selector};
pub use config::{StoreConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_STORAGE_PREFIX};
pub use persist::{Debouncer, PersistenceSlot, Scheduled};
pub use state::{ChangeSet, ShallowEq, StoreState};
pub use store::Store;
