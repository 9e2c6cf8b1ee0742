use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{trace, warn};

/// Receiver of change notifications from bound [`Observed`] cells.
///
/// Implemented by the store; cells only hold a weak handle so a slice never
/// keeps its own store alive.
pub(crate) trait Notify: Send + Sync {
    fn notify(&self, slice: &str);
}

/// Where a cell reports its writes: the owning slice and its store.
pub(crate) struct Binding {
    pub(crate) slice: Arc<str>,
    pub(crate) field: &'static str,
    pub(crate) store: Weak<dyn Notify>,
}

/// An observed field: a typed value cell that notifies its store on every write.
///
/// Declare cells as plain struct fields of a [`StateDefinition`] and list them in
/// [`StateDefinition::declare`]. Building the store binds each declared cell to
/// the slice it lives in. From then on every `set`, `replace` or `update`
/// notifies all listeners of that store, tagged with the slice name.
///
/// Writes are never filtered by equality. Assigning the value a cell already
/// holds still produces a notification; subscriptions decide for themselves
/// whether the change matters.
///
/// A cell that was never declared (or whose store has been dropped) behaves as
/// a plain lock-protected value.
///
/// ```ignore
/// struct Counter {
///     value: Observed<i64>,
/// }
///
/// impl StateDefinition for Counter {
///     fn declare(&self, fields: &mut Fields<'_>) -> Result<(), StoreError> {
///         fields.observe("value", &self.value)?;
///         Ok(())
///     }
/// }
/// ```
///
/// [`StateDefinition`]: crate::StateDefinition
/// [`StateDefinition::declare`]: crate::StateDefinition::declare
pub struct Observed<T> {
    value: RwLock<T>,
    binding: OnceLock<Binding>,
}

impl<T> Observed<T> {
    /// Create an unbound cell holding `value`.
    ///
    /// `value` becomes the field's initial value once the cell is bound.
    pub const fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            binding: OnceLock::new(),
        }
    }

    /// Return a clone of the current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// Writing to this same cell from inside `f` deadlocks.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Store `value` and notify the owning store.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.emit();
    }

    /// Store `value`, notify the owning store and return the previous value.
    pub fn replace(&self, value: T) -> T {
        let previous = std::mem::replace(&mut *self.value.write(), value);
        self.emit();
        previous
    }

    /// Mutate the value in place, then notify the owning store.
    ///
    /// The notification is sent after `f` returns and the lock is released, even
    /// if `f` left the value untouched.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut value = self.value.write();
            f(&mut value)
        };
        self.emit();
        result
    }

    /// Name of the slice this cell was bound to, if any.
    pub fn slice_name(&self) -> Option<&str> {
        self.binding.get().map(|binding| &*binding.slice)
    }

    /// Whether store construction has bound this cell.
    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Attach this cell to a store. Fails with the slice it is already bound to.
    pub(crate) fn bind(&self, binding: Binding) -> Result<(), Arc<str>> {
        self.binding
            .set(binding)
            .map_err(|_| self.binding.get().map_or_else(|| Arc::from(""), |b| b.slice.clone()))
    }

    fn emit(&self) {
        let Some(binding) = self.binding.get() else {
            trace!("write to unbound observed field");
            return;
        };

        match binding.store.upgrade() {
            Some(store) => store.notify(&binding.slice),
            None => warn!(
                slice = %binding.slice,
                field = binding.field,
                "write to observed field after its store was dropped"
            ),
        }
    }
}

impl<T: Default> Default for Observed<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("value", &*self.value.read())
            .field("slice", &self.slice_name())
            .finish()
    }
}
