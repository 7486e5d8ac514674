use std::time::Duration;

/// The configuration of an [`ExpiringMap`][map-struct], fixed at construction.
///
/// [map-struct]: ./sync/struct.ExpiringMap.html
#[derive(Clone, Debug)]
pub struct Policy {
    time_to_live: Option<Duration>,
    touch_on_get: bool,
    touch_on_iterate: bool,
    target_size: Option<usize>,
    num_segments: usize,
}

impl Policy {
    pub(crate) fn new(
        time_to_live: Option<Duration>,
        touch_on_get: bool,
        touch_on_iterate: bool,
        target_size: Option<usize>,
        num_segments: usize,
    ) -> Self {
        Self {
            time_to_live,
            touch_on_get,
            touch_on_iterate,
            target_size,
            num_segments,
        }
    }

    /// Returns the time to live of the map, or `None` when time-based expiry
    /// is disabled.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live
    }

    /// Returns `true` when a successful `get` refreshes the entry's recency.
    pub fn touch_on_get(&self) -> bool {
        self.touch_on_get
    }

    /// Returns `true` when visiting an entry during iteration refreshes its
    /// recency.
    pub fn touch_on_iterate(&self) -> bool {
        self.touch_on_iterate
    }

    /// Returns the target size of the map, or `None` when the map is
    /// unbounded.
    pub fn target_size(&self) -> Option<usize> {
        self.target_size
    }

    /// Returns the number of segments of the backing store.
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }
}
