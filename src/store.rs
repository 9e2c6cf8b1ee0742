use crate::config::{NotifyMode, StoreConfig};
use crate::error::StoreError;
use crate::hash::FastHashBuilder;
use crate::listener::{ListenerId, ListenerTable};
use crate::observed::Notify;
use crate::slice::{Fields, RootState, SliceKey, StateDefinition};
use crate::subscription::{RenderTrigger, Subscription, Watch, Watched};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A slice waiting to be registered by [`StoreBuilder::build`].
struct PendingSlice {
    name: Arc<str>,
    definition: Arc<dyn StateDefinition>,
    value: Arc<dyn Any + Send + Sync>,
}

/// Collects slice definitions and settings, then builds a [`Store`].
///
/// ```ignore
/// let store = Store::builder()
///     .slice(COUNTER, Counter::default())
///     .slice(SESSION, UserSession::default())
///     .build()?;
///
/// // Headless host: everything works except notification delivery
/// let inert = Store::builder().slice(COUNTER, Counter::default()).inert().build()?;
/// ```
pub struct StoreBuilder {
    config: StoreConfig,
    pending: Vec<PendingSlice>,
}

impl StoreBuilder {
    /// Start an empty builder with default settings.
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            pending: Vec::new(),
        }
    }

    /// Register `definition` under `key`'s name.
    ///
    /// Slices keep the order in which they are registered.
    pub fn slice<S: StateDefinition>(mut self, key: SliceKey<S>, definition: S) -> Self {
        let slice = Arc::new(definition);
        self.pending.push(PendingSlice {
            name: Arc::from(key.name()),
            definition: slice.clone(),
            value: slice,
        });
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a store whose notifications are no-ops.
    pub fn inert(mut self) -> Self {
        self.config.mode = NotifyMode::Inert;
        self
    }

    /// Cap the deferred sweeps drained after one outermost notification.
    pub fn max_deferred_sweeps(mut self, max: usize) -> Self {
        self.config.max_deferred_sweeps = max;
        self
    }

    /// Validate the slices, bind every declared observed field and create the store.
    ///
    /// The new store starts with an empty listener table. Building never touches
    /// any other store.
    pub fn build(self) -> Result<Store, StoreError> {
        let mut seen = HashSet::with_capacity_and_hasher(self.pending.len(), FastHashBuilder);
        for pending in &self.pending {
            if pending.name.is_empty() {
                return Err(StoreError::EmptySliceName);
            }
            if !seen.insert(Arc::clone(&pending.name)) {
                return Err(StoreError::DuplicateSlice(pending.name.to_string()));
            }
        }

        let config = self.config;
        let capacity = self.pending.len();
        let mut failure = None;

        let shared = Arc::new_cyclic(|this: &Weak<StoreShared>| {
            let notifier: Weak<dyn Notify> = this.clone();
            let mut root = RootState::with_capacity(capacity);

            for pending in self.pending {
                let mut fields = Fields::new(&pending.name, &notifier);
                if let Err(err) = pending.definition.declare(&mut fields) {
                    failure = Some(err);
                    break;
                }
                let observed = fields.into_declared();
                debug!(slice = %pending.name, observed = observed.len(), "slice registered");
                root.insert(pending.name, pending.value, observed);
            }

            StoreShared {
                root,
                listeners: ListenerTable::new(config),
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }

        debug!(
            slices = shared.root.len(),
            mode = ?config.mode,
            "store built with an empty listener table"
        );
        Ok(Store { shared })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct StoreShared {
    root: RootState,
    listeners: ListenerTable,
}

impl Notify for StoreShared {
    fn notify(&self, slice: &str) {
        self.listeners.notify(&self.root, slice);
    }
}

/// The state registry: one root state tree plus the listeners watching it.
///
/// A `Store` is an explicit context object. Build it once per application
/// session and hand clones to every consumer; clones share the same tree and
/// listener table.
///
/// Consumers either read the tree directly ([`read`](Self::read),
/// [`states`](Self::states)) or subscribe to part of it
/// ([`subscribe`](Self::subscribe), [`subscribe_slice`](Self::subscribe_slice)).
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl Store {
    /// Start building a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// The whole state tree.
    pub fn states(&self) -> &RootState {
        &self.shared.root
    }

    /// Read-only access without a selector. Registers nothing.
    pub fn read(&self) -> Watched<'_, ()> {
        Watched {
            watch_value: None,
            states: self.states(),
        }
    }

    /// Subscribe to a value derived from the state tree.
    ///
    /// After every notification the selector is re-run; `trigger` is asked for a
    /// re-render only if the result differs (by `PartialEq`) from the previous
    /// result. The listener is removed when the returned subscription is dropped.
    pub fn subscribe<T, F>(&self, selector: F, trigger: impl RenderTrigger) -> Subscription<T>
    where
        T: PartialEq + Send + 'static,
        F: Fn(&RootState) -> T + Send + Sync + 'static,
    {
        // No sweep may run between reading the initial value and registering,
        // or a concurrent write would leave the cache stale
        self.shared.listeners.with_sweeps_paused(|| {
            let initial = selector(self.states());
            Subscription::register(self, Watch::selector(Box::new(selector), initial), trigger)
        })
    }

    /// Subscribe to an entire slice.
    ///
    /// Every write to one of the slice's observed fields asks `trigger` for a
    /// re-render, whether or not the slice's contents compare equal to before.
    /// Writes to other slices never do.
    pub fn subscribe_slice<S: StateDefinition>(
        &self,
        key: SliceKey<S>,
        trigger: impl RenderTrigger,
    ) -> Result<Subscription<Arc<S>>, StoreError> {
        let slice = self
            .states()
            .get_arc(&key)
            .ok_or_else(|| StoreError::UnknownSlice(key.name().to_string()))?;
        let watch = Watch::slice(
            Arc::from(key.name()),
            Box::new(move |_: &RootState| Arc::clone(&slice)),
        );
        Ok(Subscription::register(self, watch, trigger))
    }

    /// Register a raw listener, called with the tree and the changed slice name.
    ///
    /// Raw listeners are not removed automatically; pair every call with
    /// [`remove_listener`](Self::remove_listener), or use a [`Subscription`].
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RootState, &str) + Send + Sync + 'static,
    {
        self.shared.listeners.add(Arc::new(listener))
    }

    /// Remove a listener. Removing an unknown id does nothing.
    pub fn remove_listener(&self, id: ListenerId) {
        self.shared.listeners.remove(id);
    }

    /// Whether `id` is currently registered.
    pub fn contains_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.contains(id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Notify every listener that `slice` changed.
    ///
    /// Observed-field writes call this for you. Use it after mutating state the
    /// store does not observe.
    pub fn notify(&self, slice: &str) {
        self.shared.notify(slice);
    }

    /// Settings this store was built with.
    pub fn config(&self) -> StoreConfig {
        self.shared.listeners.config()
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("states", &self.shared.root)
            .field("listeners", &self.listener_count())
            .field("config", &self.config())
            .finish()
    }
}
