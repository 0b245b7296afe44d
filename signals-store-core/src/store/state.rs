//! State shapes, change detection, and the `store_state!` declaration macro.
//!
//! A store's state is a plain struct whose field set is fixed at compile
//! time. [`store_state!`](crate::store_state) declares the struct together
//! with the two companion types the store needs:
//!
//! - a *cells* struct holding one [`FieldCell`](super::FieldCell) per field;
//! - a *patch* struct holding one `Option` per field.
//!
//! and implements [`StoreState`] for it, which is where the per-field diff
//! loop lives.
//!
//! # Change detection
//!
//! Diffing is shallow: each top-level field is compared with
//! [`ShallowEq`]. Scalars and strings compare by value; `Arc` fields compare
//! by pointer. Nested data is meant to live behind `Arc` and be edited with
//! `Arc::make_mut`, which copies on write, so an edited field gets a new
//! pointer while untouched fields keep theirs. The diff therefore costs one
//! comparison per field regardless of how large the nested data is.

use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::Result;

/// Field-level equality used by the diff.
///
/// "Equal" means "a reader could not tell the two apart without looking
/// inside": value equality for plain data, pointer identity for `Arc`.
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

macro_rules! shallow_eq_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ShallowEq for $ty {
                fn shallow_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

shallow_eq_by_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    serde_json::Value,
);

macro_rules! shallow_eq_float {
    ($($ty:ty),*) => {
        $(
            // NaN equals NaN here, otherwise a NaN field never settles.
            impl ShallowEq for $ty {
                fn shallow_eq(&self, other: &Self) -> bool {
                    self == other || (self.is_nan() && other.is_nan())
                }
            }
        )*
    };
}

shallow_eq_float!(f32, f64);

impl<T: ?Sized> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ShallowEq> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.shallow_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: PartialEq> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self == other
    }
}

/// Names of the fields one update changed, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(SmallVec<[&'static str; 8]>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str) {
        if !self.contains(field) {
            self.0.push(field);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|changed| *changed == field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a &'static str;
    type IntoIter = std::slice::Iter<'a, &'static str>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A flat state record with a statically known field set.
///
/// Implement it with [`store_state!`](crate::store_state) rather than by
/// hand; the macro keeps the field list, the cells, and the patch type in
/// sync.
pub trait StoreState: Clone + Serialize + Send + Sync + 'static {
    /// One [`FieldCell`](super::FieldCell) per field.
    type Cells: Clone + Send + Sync + 'static;

    /// One `Option` per field; `None` leaves the field alone.
    type Patch: Default + Send + 'static;

    /// Field names in declaration order.
    const FIELDS: &'static [&'static str];

    fn has_field(name: &str) -> bool {
        Self::FIELDS.contains(&name)
    }

    /// Build the cell table from the current values.
    fn create_cells(&self) -> Self::Cells;

    /// Fields whose value differs between `self` and `next`.
    fn diff(&self, next: &Self) -> ChangeSet;

    /// Write the changed fields of `self` into `cells`.
    fn publish(&self, cells: &Self::Cells, changes: &ChangeSet);

    /// Overwrite every field the patch sets.
    fn apply_patch(&mut self, patch: Self::Patch);

    /// Copy the named fields of `from` into `self`.
    fn merge_fields(&mut self, from: &Self, fields: &ChangeSet);

    /// Overwrite one field from its JSON form.
    ///
    /// A value equal to the current one (compared as JSON) is skipped, so the
    /// field keeps its identity.
    fn apply_field(&mut self, field: &str, value: serde_json::Value) -> Result<()>;
}

/// Declare a store state struct plus its cells and patch types.
///
/// ```rust
/// use std::sync::Arc;
/// use serde::{Deserialize, Serialize};
/// use signals_store_core::store_state;
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct User {
///     pub first_name: String,
///     pub last_name: String,
/// }
///
/// store_state! {
///     #[derive(Debug, Clone, Serialize, Deserialize)]
///     pub struct AppState {
///         pub user: Arc<User>,
///         pub loading: bool,
///     }
///     pub struct AppStateCells;
///     pub struct AppStatePatch;
/// }
/// ```
///
/// The state struct must derive `Clone` and `Serialize`; every field type
/// must implement `ShallowEq`, `Serialize` and `DeserializeOwned`.
#[macro_export]
macro_rules! store_state {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
        $cells_vis:vis struct $cells:ident;
        $patch_vis:vis struct $patch:ident;
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        #[doc = concat!("Reactive cells of [`", stringify!($name), "`], one per field.")]
        #[derive(Clone)]
        $cells_vis struct $cells {
            $(
                pub $field: $crate::store::FieldCell<$ty>,
            )*
        }

        #[doc = concat!("Partial update of [`", stringify!($name), "`].")]
        #[derive(Clone, Default)]
        $patch_vis struct $patch {
            $(
                pub $field: ::std::option::Option<$ty>,
            )*
        }

        impl $crate::store::StoreState for $name {
            type Cells = $cells;
            type Patch = $patch;

            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn create_cells(&self) -> $cells {
                $cells {
                    $(
                        $field: $crate::store::FieldCell::new(
                            stringify!($field),
                            ::std::clone::Clone::clone(&self.$field),
                        ),
                    )*
                }
            }

            fn diff(&self, next: &Self) -> $crate::store::ChangeSet {
                #[allow(unused_mut)]
                let mut changes = $crate::store::ChangeSet::new();
                $(
                    if !$crate::store::ShallowEq::shallow_eq(&self.$field, &next.$field) {
                        changes.push(stringify!($field));
                    }
                )*
                changes
            }

            fn publish(&self, cells: &$cells, changes: &$crate::store::ChangeSet) {
                $(
                    if changes.contains(stringify!($field)) {
                        $crate::__private::publish(
                            &cells.$field,
                            ::std::clone::Clone::clone(&self.$field),
                        );
                    }
                )*
            }

            fn apply_patch(&mut self, patch: $patch) {
                $(
                    if let ::std::option::Option::Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
            }

            fn merge_fields(&mut self, from: &Self, fields: &$crate::store::ChangeSet) {
                $(
                    if fields.contains(stringify!($field)) {
                        self.$field = ::std::clone::Clone::clone(&from.$field);
                    }
                )*
            }

            fn apply_field(
                &mut self,
                field: &str,
                value: $crate::__private::serde_json::Value,
            ) -> $crate::Result<()> {
                $(
                    if field == stringify!($field) {
                        let current = $crate::__private::serde_json::to_value(&self.$field)
                            .map_err($crate::StoreError::Serialize)?;
                        if current != value {
                            self.$field = $crate::__private::serde_json::from_value(value)
                                .map_err(|source| $crate::StoreError::InvalidField {
                                    field: field.to_owned(),
                                    source,
                                })?;
                        }
                        return ::std::result::Result::Ok(());
                    }
                )*
                ::std::result::Result::Err($crate::StoreError::UnknownField {
                    field: field.to_owned(),
                })
            }
        }
    };
}
