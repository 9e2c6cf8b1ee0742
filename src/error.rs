use thiserror::Error;

/// Errors raised while building a [`Store`](crate::Store) or looking up a slice.
///
/// Runtime operations (writes, notification, listener add/remove, dropping a
/// subscription) never fail; only construction and slice lookup do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Two slices were registered under the same name.
    #[error("slice `{0}` is registered more than once")]
    DuplicateSlice(String),

    /// A slice was registered under the empty name.
    #[error("slice names must not be empty")]
    EmptySliceName,

    /// A definition declared the same observed field name twice.
    #[error("slice `{slice}` declares observed field `{field}` more than once")]
    DuplicateField {
        /// Slice the declaration belongs to.
        slice: String,
        /// Field name that was declared again.
        field: &'static str,
    },

    /// An observed cell was declared twice, or already belongs to another store.
    #[error("observed field `{field}` of slice `{slice}` is already bound to `{bound_to}`")]
    CellAlreadyBound {
        /// Slice that attempted the binding.
        slice: String,
        /// Field name used in the failing declaration.
        field: &'static str,
        /// Slice the cell was bound to first.
        bound_to: String,
    },

    /// No slice with this name (and type) exists in the store.
    #[error("no slice named `{0}` with the requested type")]
    UnknownSlice(String),
}
