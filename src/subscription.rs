use crate::listener::ListenerId;
use crate::slice::RootState;
use crate::store::Store;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Receiver of "re-render needed" requests.
///
/// The store only decides *whether* a consumer must re-render; how that
/// happens belongs to the host (bumping a state counter, queueing a frame,
/// marking a widget dirty). Any `Fn() + Send + Sync` closure is a trigger.
pub trait RenderTrigger: Send + Sync + 'static {
    /// Ask the consumer to re-render.
    fn request_render(&self);
}

impl<F> RenderTrigger for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn request_render(&self) {
        self()
    }
}

/// Monotonically increasing render counter.
///
/// Clones share the same count, so one clone can be handed to a subscription
/// while the host keeps another to observe it.
#[derive(Clone, Debug, Default)]
pub struct RenderCounter {
    count: Arc<AtomicU64>,
}

impl RenderCounter {
    /// Counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render requests received so far.
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

impl RenderTrigger for RenderCounter {
    fn request_render(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

/// Result of reading the store: the watched value and the whole tree.
pub struct Watched<'a, T> {
    /// Current derived value; `None` when reading without a selector.
    pub watch_value: Option<T>,
    /// The whole state tree.
    pub states: &'a RootState,
}

impl<T: fmt::Debug> fmt::Debug for Watched<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watched")
            .field("watch_value", &self.watch_value)
            .field("states", self.states)
            .finish()
    }
}

pub(crate) type Selector<T> = Box<dyn Fn(&RootState) -> T + Send + Sync>;

/// What a subscription watches, and how it decides a re-render is due.
pub(crate) enum Watch<T> {
    /// A whole slice: any change to it is a change for the consumer.
    Slice { name: Arc<str>, select: Selector<T> },
    /// A derived value, compared with the previous result.
    Derived {
        select: Selector<T>,
        cached: Mutex<T>,
        same: fn(&T, &T) -> bool,
    },
}

impl<T> Watch<T> {
    pub(crate) fn slice(name: Arc<str>, select: Selector<T>) -> Self {
        Watch::Slice { name, select }
    }

    pub(crate) fn selector(select: Selector<T>, initial: T) -> Self
    where
        T: PartialEq,
    {
        Watch::Derived {
            select,
            cached: Mutex::new(initial),
            same: <T as PartialEq>::eq,
        }
    }

    fn select(&self, root: &RootState) -> T {
        match self {
            Watch::Slice { select, .. } | Watch::Derived { select, .. } => select(root),
        }
    }

    /// Whether a change to `changed` requires a re-render. Refreshes the cache.
    fn needs_render(&self, root: &RootState, changed: &str) -> bool {
        match self {
            Watch::Slice { name, .. } => {
                let hit = **name == *changed;
                if hit {
                    cov_mark::hit!(slice_watch_forces_render);
                }
                hit
            }
            Watch::Derived {
                select,
                cached,
                same,
            } => {
                let next = select(root);
                let mut cached = cached.lock();
                let unchanged = same(&cached, &next);
                if unchanged {
                    cov_mark::hit!(selector_unchanged_skips_render);
                }
                *cached = next;
                !unchanged
            }
        }
    }
}

/// A consumer's subscription to the store.
///
/// Create one when the consumer mounts and call [`read`](Self::read) on every
/// render. Exactly one listener is registered for the subscription's whole
/// lifetime; dropping the subscription (the consumer's teardown) removes it.
///
/// ```ignore
/// let renders = RenderCounter::new();
/// let count = store.subscribe(|s| s[COUNTER].value.get(), renders.clone());
///
/// store.states()[COUNTER].value.set(1);
/// assert_eq!(renders.get(), 1);
/// assert_eq!(count.read().watch_value, Some(1));
/// ```
pub struct Subscription<T> {
    store: Store,
    id: ListenerId,
    watch: Arc<Watch<T>>,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn register(store: &Store, watch: Watch<T>, trigger: impl RenderTrigger) -> Self {
        let watch = Arc::new(watch);
        let listener_watch = Arc::clone(&watch);
        let id = store.add_listener(move |root, changed| {
            if listener_watch.needs_render(root, changed) {
                trigger.request_render();
            } else {
                trace!(changed, "watched value unchanged, render skipped");
            }
        });

        Self {
            store: store.clone(),
            id,
            watch,
        }
    }
}

impl<T> Subscription<T> {
    /// Compute the watched value from the live tree.
    ///
    /// Always re-runs the selector; the cached comparison value is not used.
    pub fn read(&self) -> Watched<'_, T> {
        let states = self.store.states();
        Watched {
            watch_value: Some(self.watch.select(states)),
            states,
        }
    }

    /// Id of the listener backing this subscription.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The store this subscription is attached to.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.store.remove_listener(self.id);
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.watch {
            Watch::Slice { .. } => "slice",
            Watch::Derived { .. } => "selector",
        };
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("watch", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_counter_clones_share_a_count() {
        let counter = RenderCounter::new();
        let handle = counter.clone();

        handle.request_render();
        handle.request_render();

        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn derived_watch_updates_cache_on_every_check() {
        let root = RootState::default();
        let next = Arc::new(Mutex::new(1));
        let source = Arc::clone(&next);
        let watch = Watch::selector(Box::new(move |_: &RootState| *source.lock()), 1);

        assert!(!watch.needs_render(&root, "A"));
        *next.lock() = 2;
        assert!(watch.needs_render(&root, "A"));
        // Cache now holds 2
        assert!(!watch.needs_render(&root, "A"));
    }

    #[test]
    fn slice_watch_matches_only_its_own_name() {
        let root = RootState::default();
        let watch = Watch::slice(Arc::from("Counter"), Box::new(|_: &RootState| ()));

        assert!(watch.needs_render(&root, "Counter"));
        assert!(!watch.needs_render(&root, "Session"));
    }
}
