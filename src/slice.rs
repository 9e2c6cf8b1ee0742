use crate::error::StoreError;
use crate::hash::FastIndexMap;
use crate::observed::{Binding, Notify, Observed};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;
use std::sync::{Arc, Weak};
use tracing::trace;

/// One named slice of application state.
///
/// A definition is an ordinary struct. Fields that should notify subscribers
/// on write are [`Observed`] cells and are listed in [`declare`](Self::declare).
/// Every other field is left alone by the store.
///
/// Definitions that declare nothing are accepted; writes to them never notify.
pub trait StateDefinition: Any + Send + Sync {
    /// List the observed fields of this definition.
    ///
    /// Called exactly once, while the store is being built.
    fn declare(&self, fields: &mut Fields<'_>) -> Result<(), StoreError> {
        let _ = fields;
        Ok(())
    }
}

/// Declarator handed to [`StateDefinition::declare`].
///
/// Binds each observed cell to the slice being registered and remembers the
/// declared field names.
pub struct Fields<'a> {
    slice: &'a Arc<str>,
    store: &'a Weak<dyn Notify>,
    declared: Vec<&'static str>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(slice: &'a Arc<str>, store: &'a Weak<dyn Notify>) -> Self {
        Self {
            slice,
            store,
            declared: Vec::new(),
        }
    }

    /// Name of the slice currently being registered.
    pub fn slice_name(&self) -> &str {
        self.slice
    }

    /// Declare `cell` as the observed field `field`.
    ///
    /// Fails if `field` was already declared for this slice, or if `cell` is
    /// already bound (declared twice, or owned by another store).
    pub fn observe<T>(
        &mut self,
        field: &'static str,
        cell: &Observed<T>,
    ) -> Result<&mut Self, StoreError> {
        if self.declared.contains(&field) {
            return Err(StoreError::DuplicateField {
                slice: self.slice.to_string(),
                field,
            });
        }

        cell.bind(Binding {
            slice: Arc::clone(self.slice),
            field,
            store: self.store.clone(),
        })
        .map_err(|bound_to| StoreError::CellAlreadyBound {
            slice: self.slice.to_string(),
            field,
            bound_to: bound_to.to_string(),
        })?;

        trace!(slice = %self.slice, field, "observed field bound");
        self.declared.push(field);
        Ok(self)
    }

    pub(crate) fn into_declared(self) -> Vec<&'static str> {
        self.declared
    }
}

/// Typed name of a slice, used to register it and to look it up again.
///
/// ```ignore
/// const COUNTER: SliceKey<Counter> = SliceKey::new("Counter");
/// ```
pub struct SliceKey<S> {
    name: &'static str,
    _slice: PhantomData<fn() -> S>,
}

impl<S> SliceKey<S> {
    /// Create a key for the slice registered under `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _slice: PhantomData,
        }
    }

    /// The slice name.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<S> Clone for SliceKey<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SliceKey<S> {}

impl<S> fmt::Debug for SliceKey<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SliceKey").field(&self.name).finish()
    }
}

struct SliceEntry {
    value: Arc<dyn Any + Send + Sync>,
    observed: Vec<&'static str>,
}

/// The composed state tree: every registered slice, by name, in registration order.
///
/// Built once per store. The set of slices never changes afterwards; only the
/// slices' own fields mutate.
#[derive(Default)]
pub struct RootState {
    slices: FastIndexMap<Arc<str>, SliceEntry>,
}

impl RootState {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slices: FastIndexMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub(crate) fn insert(
        &mut self,
        name: Arc<str>,
        value: Arc<dyn Any + Send + Sync>,
        observed: Vec<&'static str>,
    ) {
        self.slices.insert(name, SliceEntry { value, observed });
    }

    /// Borrow the slice registered under `key`, if it exists with that type.
    pub fn get<S: StateDefinition>(&self, key: &SliceKey<S>) -> Option<&S> {
        self.slices.get(key.name)?.value.downcast_ref::<S>()
    }

    /// Shared handle to the slice registered under `key`.
    pub fn get_arc<S: StateDefinition>(&self, key: &SliceKey<S>) -> Option<Arc<S>> {
        let entry = self.slices.get(key.name)?;
        Arc::clone(&entry.value).downcast::<S>().ok()
    }

    /// Identity tag of `slice`: the name it is registered under in this tree.
    ///
    /// Matches by address, so a structurally equal definition that is not part
    /// of this tree has no name.
    pub fn name_of<S: StateDefinition>(&self, slice: &S) -> Option<&str> {
        let target = slice as *const S as *const ();
        self.slices
            .iter()
            .find(|(_, entry)| Arc::as_ptr(&entry.value) as *const () == target)
            .map(|(name, _)| &**name)
    }

    /// Observed field names declared by the slice `name`.
    pub fn observed_fields(&self, name: &str) -> Option<&[&'static str]> {
        self.slices.get(name).map(|entry| entry.observed.as_slice())
    }

    /// Slice names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(|name| &**name)
    }

    /// Whether a slice named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.slices.contains_key(name)
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether the tree has no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl<S: StateDefinition> Index<SliceKey<S>> for RootState {
    type Output = S;

    /// Panics if no slice of type `S` is registered under the key's name.
    fn index(&self, key: SliceKey<S>) -> &S {
        match self.get(&key) {
            Some(slice) => slice,
            None => panic!("no slice named `{}` of the requested type", key.name),
        }
    }
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.slices
                    .iter()
                    .map(|(name, entry)| (&**name, &entry.observed)),
            )
            .finish()
    }
}
