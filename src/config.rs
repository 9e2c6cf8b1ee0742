/// Default cap on deferred sweeps delivered after one outermost notification.
///
/// A listener that writes an observed field while a sweep is running queues a
/// follow-up sweep instead of recursing. This bounds how many of those are
/// drained before the rest are discarded.
pub const DEFAULT_MAX_DEFERRED_SWEEPS: usize = 64;

/// Whether a store delivers notifications at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NotifyMode {
    /// Writes to observed fields notify every registered listener.
    #[default]
    Live,
    /// Construction, reads and writes work normally but notifications are dropped.
    ///
    /// Intended for headless hosts (tests of non-UI code, server-side rendering)
    /// where nothing can re-render anyway.
    Inert,
}

/// Construction-time settings for a [`Store`](crate::Store).
///
/// Usually set through [`StoreBuilder`](crate::StoreBuilder) methods rather than
/// built by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Live or inert notification delivery.
    pub mode: NotifyMode,
    /// Maximum number of deferred sweeps drained per outermost notification.
    ///
    /// `0` drops every reentrant notification with an error log. The write that
    /// raised it is still applied; the caller is not told.
    pub max_deferred_sweeps: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::Live,
            max_deferred_sweeps: DEFAULT_MAX_DEFERRED_SWEEPS,
        }
    }
}
