//! Reactive Primitives
//!
//! The change-propagation layer under the stores.
//!
//! - [`Signal`]: a versioned value. Reads inside a memo or effect are
//!   recorded; every write bumps the version and pushes an invalidation.
//! - [`Memo`]: a cached derivation. Invalidation only marks it; the next read
//!   compares the recorded versions and recomputes if one moved. Store
//!   selectors are memos.
//! - [`Effect`]: an eager callback, re-run as soon as something it read
//!   changes. Writes made inside [`Runtime::batch`] reach each effect once.
//!
//! Tracking is per thread: [`ReactiveContext`] keeps a stack of the
//! computations currently running, and every tracked read lands in the top
//! entry together with the version it saw.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use context::{Dependency, ReactiveContext, Source};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
pub use subscriber::SubscriberId;
