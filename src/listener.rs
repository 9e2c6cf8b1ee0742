// Listener table - the store's registry of change callbacks
//
// Callbacks live in an insertion-ordered map so a sweep visits them in the
// order they were registered, and removal keeps the order of the rest.
//
// SWEEP MODEL:
// - notify() snapshots (id, callback) pairs, then invokes them with no table
//   lock held, so callbacks may add or remove listeners freely
// - a listener removed mid-sweep is skipped if not reached yet
// - a listener added mid-sweep first runs on the next sweep
// - a notify() raised from inside a callback on the sweeping thread is queued
//   and delivered FIFO once the current sweep completes
// - sweeps from other threads wait on the dispatch lock

use crate::config::{NotifyMode, StoreConfig};
use crate::hash::FastIndexMap;
use crate::slice::RootState;
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

/// Callback invoked with the whole root state and the name of the changed slice.
pub(crate) type Callback = Arc<dyn Fn(&RootState, &str) + Send + Sync>;

/// Identifier of a registered listener.
///
/// Allocated from a per-store counter, so ids are never reused while the store
/// is alive.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Default)]
struct Dispatch {
    sweeping: bool,
    deferred: VecDeque<Arc<str>>,
}

/// Resets the dispatch state when the outermost sweep ends, even on unwind.
struct SweepGuard<'a> {
    state: &'a RefCell<Dispatch>,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.sweeping = false;
        state.deferred.clear();
    }
}

pub(crate) struct ListenerTable {
    next_id: AtomicU64,
    entries: RwLock<FastIndexMap<ListenerId, Callback>>,
    dispatch: ReentrantMutex<RefCell<Dispatch>>,
    config: StoreConfig,
}

impl ListenerTable {
    pub(crate) fn new(config: StoreConfig) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(FastIndexMap::default()),
            dispatch: ReentrantMutex::new(RefCell::new(Dispatch::default())),
            config,
        }
    }

    pub(crate) fn config(&self) -> StoreConfig {
        self.config
    }

    /// Register `callback` at the end of the sweep order.
    pub(crate) fn add(&self, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().insert(id, callback);
        trace!(%id, "listener added");
        id
    }

    /// Run `f` while no sweep can start on another thread.
    ///
    /// A sweep already running on this thread is unaffected.
    pub(crate) fn with_sweeps_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        let _dispatch = self.dispatch.lock();
        f()
    }

    /// Remove a listener. Unknown ids are ignored; returns whether one was removed.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let removed = self.entries.write().shift_remove(&id).is_some();
        trace!(%id, removed, "listener removed");
        removed
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Invoke every listener with `root` and the name of the changed slice.
    pub(crate) fn notify(&self, root: &RootState, slice: &str) {
        if self.config.mode == NotifyMode::Inert {
            trace!(slice, "inert store, notification dropped");
            return;
        }

        let dispatch = self.dispatch.lock();
        {
            let mut state = dispatch.borrow_mut();
            if state.sweeping {
                cov_mark::hit!(reentrant_notify_deferred);
                trace!(slice, "notification raised during a sweep, deferred");
                state.deferred.push_back(Arc::from(slice));
                return;
            }
            state.sweeping = true;
        }
        let _sweep = SweepGuard { state: &dispatch };

        self.sweep(root, slice);

        let mut drained = 0;
        loop {
            let next = dispatch.borrow_mut().deferred.pop_front();
            let Some(next) = next else {
                break;
            };
            if drained == self.config.max_deferred_sweeps {
                cov_mark::hit!(deferred_cascade_capped);
                let discarded = dispatch.borrow().deferred.len() + 1;
                error!(
                    limit = self.config.max_deferred_sweeps,
                    discarded, "deferred notification cascade exceeded its limit"
                );
                break;
            }
            drained += 1;
            self.sweep(root, &next);
        }

        if drained > 0 {
            debug!(drained, "deferred notifications delivered");
        }
    }

    fn sweep(&self, root: &RootState, slice: &str) {
        let snapshot: Vec<(ListenerId, Callback)> = self
            .entries
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();
        trace!(slice, listeners = snapshot.len(), "notification sweep");

        for (id, callback) in snapshot {
            // Removed by an earlier callback in this sweep
            if !self.contains(id) {
                continue;
            }
            callback(root, slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Weak;

    fn log_into(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Callback {
        let log = Arc::clone(log);
        Arc::new(move |_root: &RootState, slice: &str| {
            log.lock().push(format!("{tag}:{slice}"));
        })
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let table = ListenerTable::new(StoreConfig::default());
        let a = table.add(Arc::new(|_: &RootState, _: &str| {}));
        let b = table.add(Arc::new(|_: &RootState, _: &str| {}));
        table.remove(a);
        let c = table.add(Arc::new(|_: &RootState, _: &str| {}));

        assert!(a < b && b < c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn notify_visits_listeners_in_insertion_order() {
        let root = RootState::default();
        let table = ListenerTable::new(StoreConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        table.add(log_into(&log, "first"));
        let middle = table.add(log_into(&log, "middle"));
        table.add(log_into(&log, "last"));
        table.remove(middle);

        table.notify(&root, "Counter");

        assert_eq!(*log.lock(), vec!["first:Counter", "last:Counter"]);
    }

    #[test]
    fn removing_unknown_id_is_a_no_op() {
        let table = ListenerTable::new(StoreConfig::default());
        let id = table.add(Arc::new(|_: &RootState, _: &str| {}));

        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn listener_removed_mid_sweep_is_skipped() {
        let root = RootState::default();
        let table = Arc::new(ListenerTable::new(StoreConfig::default()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let weak: Weak<ListenerTable> = Arc::downgrade(&table);
        let victim_slot = Arc::clone(&victim);
        table.add(Arc::new(move |_: &RootState, _: &str| {
            if let (Some(table), Some(id)) = (weak.upgrade(), *victim_slot.lock()) {
                table.remove(id);
            }
        }));
        *victim.lock() = Some(table.add(log_into(&log, "victim")));

        table.notify(&root, "Counter");

        assert!(log.lock().is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn listener_added_mid_sweep_runs_next_time() {
        let root = RootState::default();
        let table = Arc::new(ListenerTable::new(StoreConfig::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&table);
        let late = log_into(&log, "late");
        let added = Arc::new(Mutex::new(false));
        table.add(Arc::new(move |_: &RootState, _: &str| {
            let mut added = added.lock();
            if !*added {
                *added = true;
                if let Some(table) = weak.upgrade() {
                    table.add(Arc::clone(&late));
                }
            }
        }));

        table.notify(&root, "A");
        assert!(log.lock().is_empty());

        table.notify(&root, "B");
        assert_eq!(*log.lock(), vec!["late:B"]);
    }

    #[test]
    fn reentrant_notify_is_deferred_until_sweep_ends() {
        cov_mark::check!(reentrant_notify_deferred);

        let root = RootState::default();
        let table = Arc::new(ListenerTable::new(StoreConfig::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&table);
        let inner_log = Arc::clone(&log);
        table.add(Arc::new(move |root: &RootState, slice: &str| {
            inner_log.lock().push(format!("writer:{slice}"));
            if slice == "A" {
                if let Some(table) = weak.upgrade() {
                    table.notify(root, "B");
                }
            }
        }));
        table.add(log_into(&log, "reader"));

        table.notify(&root, "A");

        assert_eq!(
            *log.lock(),
            vec!["writer:A", "reader:A", "writer:B", "reader:B"]
        );
    }

    #[test]
    fn deferred_cascade_is_capped() {
        cov_mark::check!(deferred_cascade_capped);

        let root = RootState::default();
        let table = Arc::new(ListenerTable::new(StoreConfig {
            max_deferred_sweeps: 3,
            ..StoreConfig::default()
        }));
        let sweeps = Arc::new(Mutex::new(0usize));

        let weak = Arc::downgrade(&table);
        let counter = Arc::clone(&sweeps);
        table.add(Arc::new(move |root: &RootState, slice: &str| {
            *counter.lock() += 1;
            if let Some(table) = weak.upgrade() {
                table.notify(root, slice);
            }
        }));

        table.notify(&root, "Loop");

        // The outermost sweep plus three deferred ones
        assert_eq!(*sweeps.lock(), 4);

        // Dispatch state was reset, so a fresh notify starts a new cascade
        table.notify(&root, "Loop");
        assert_eq!(*sweeps.lock(), 8);
    }

    #[test]
    fn zero_cap_drops_every_reentrant_notification() {
        let root = RootState::default();
        let table = Arc::new(ListenerTable::new(StoreConfig {
            max_deferred_sweeps: 0,
            ..StoreConfig::default()
        }));
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&table);
        let inner_log = Arc::clone(&log);
        table.add(Arc::new(move |root: &RootState, slice: &str| {
            inner_log.lock().push(slice.to_owned());
            if let Some(table) = weak.upgrade() {
                table.notify(root, "Echo");
            }
        }));

        table.notify(&root, "Counter");

        // Only the outermost sweep ran; the queued one was logged and dropped
        assert_eq!(*log.lock(), vec!["Counter"]);
    }

    #[test]
    fn inert_table_never_invokes_listeners() {
        let root = RootState::default();
        let table = ListenerTable::new(StoreConfig {
            mode: NotifyMode::Inert,
            ..StoreConfig::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        table.add(log_into(&log, "listener"));

        table.notify(&root, "Counter");

        assert!(log.lock().is_empty());
        assert_eq!(table.len(), 1);
    }
}
