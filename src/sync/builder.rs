use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    sync::Arc,
    time::Duration,
};

use super::ExpiringMap;
use crate::common::{builder_utils, error::ConfigError, DEFAULT_NUM_SEGMENTS};
use crate::notification::EvictionListener;

/// Builds an [`ExpiringMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.ExpiringMap.html
///
/// # Examples
///
/// ```rust
/// use expiry_map::sync::ExpiringMap;
///
/// use std::time::Duration;
///
/// let map: ExpiringMap<String, String> = ExpiringMap::builder()
///     // Entries expire 30 minutes after their last touch.
///     .time_to_live(Duration::from_secs(30 * 60))
///     // Reads count as touches.
///     .touch_on_get(true)
///     // Keep at most 10,000 raw entries.
///     .target_size(10_000)
///     // Create the map.
///     .build();
///
/// map.insert("key".to_string(), "value".to_string());
/// ```
pub struct ExpiringMapBuilder<K, V> {
    name: Option<String>,
    time_to_live: Option<Duration>,
    touch_on_get: bool,
    touch_on_iterate: bool,
    target_size: Option<usize>,
    initial_capacity: Option<usize>,
    num_segments: Option<usize>,
    eviction_listener: Option<EvictionListener<K, V>>,
}

impl<K, V> Default for ExpiringMapBuilder<K, V> {
    fn default() -> Self {
        Self {
            name: None,
            time_to_live: None,
            touch_on_get: false,
            touch_on_iterate: false,
            target_size: None,
            initial_capacity: None,
            num_segments: None,
            eviction_listener: None,
        }
    }
}

impl<K, V> ExpiringMapBuilder<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `ExpiringMapBuilder` with every knob at its default:
    /// no expiry, no size bound, no touching accessors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the map. The name appears in log output.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the time to live of the map.
    ///
    /// An entry expires once the given duration has passed since its last
    /// touch. A zero duration disables time-based expiry.
    pub fn time_to_live(self, duration: Duration) -> Self {
        let time_to_live = if duration.is_zero() {
            None
        } else {
            Some(duration)
        };
        Self {
            time_to_live,
            ..self
        }
    }

    /// Makes a successful `get` refresh the touched entry's recency.
    ///
    /// `contains_key` and `contains_value` never touch, with or without this
    /// flag.
    pub fn touch_on_get(self, enabled: bool) -> Self {
        Self {
            touch_on_get: enabled,
            ..self
        }
    }

    /// Makes the iterator refresh each entry's recency as it is visited.
    pub fn touch_on_iterate(self, enabled: bool) -> Self {
        Self {
            touch_on_iterate: enabled,
            ..self
        }
    }

    /// Sets the target size of the map. Inserts that push the raw entry count
    /// beyond this bound evict the least-recently-touched entries until the
    /// bound holds again. Zero disables size bounding.
    pub fn target_size(self, target_size: usize) -> Self {
        let target_size = if target_size == 0 {
            None
        } else {
            Some(target_size)
        };
        Self {
            target_size,
            ..self
        }
    }

    /// Sets the initial capacity of the map.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    /// Sets the number of segments of the backing store, rounded up to the
    /// nearest power of two.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is zero.
    pub fn segments(self, num_segments: usize) -> Self {
        assert!(num_segments > 0);

        Self {
            num_segments: Some(num_segments),
            ..self
        }
    }

    /// Sets the eviction listener closure of the map, invoked with the key and
    /// value of every entry removed by the size bound.
    ///
    /// The listener runs synchronously on the inserting thread; see
    /// [`EvictionListener`](../notification/type.EvictionListener.html) for
    /// the constraints it must observe. A panic raised by the listener
    /// propagates to the caller of the triggering insert.
    pub fn eviction_listener(
        self,
        listener: impl Fn(Arc<K>, V) + Send + Sync + 'static,
    ) -> Self {
        Self {
            eviction_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Builds an `ExpiringMap<K, V>`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use
    /// [`try_build`](#method.try_build) to handle the error instead.
    pub fn build(self) -> ExpiringMap<K, V, RandomState> {
        match self.try_build() {
            Ok(map) => map,
            Err(e) => panic!("{e}"),
        }
    }

    /// Builds an `ExpiringMap<K, V>`, reporting an invalid configuration as a
    /// [`ConfigError`](../enum.ConfigError.html).
    pub fn try_build(self) -> Result<ExpiringMap<K, V, RandomState>, ConfigError> {
        builder_utils::ensure_time_to_live(self.time_to_live)?;
        Ok(self.map_with_hasher(RandomState::default()))
    }

    /// Builds an `ExpiringMap<K, V, S>` with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build_with_hasher<S>(self, hasher: S) -> ExpiringMap<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        if let Err(e) = builder_utils::ensure_time_to_live(self.time_to_live) {
            panic!("{e}");
        }
        self.map_with_hasher(hasher)
    }

    fn map_with_hasher<S>(self, hasher: S) -> ExpiringMap<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        ExpiringMap::with_everything(
            self.name,
            self.time_to_live,
            self.touch_on_get,
            self.touch_on_iterate,
            self.target_size,
            self.initial_capacity,
            self.num_segments.unwrap_or(DEFAULT_NUM_SEGMENTS),
            self.eviction_listener,
            hasher,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ExpiringMapBuilder;

    use std::time::Duration;

    #[test]
    fn build_map() {
        // ExpiringMap<char, String>
        let map = ExpiringMapBuilder::new().build();

        let policy = map.policy();
        assert_eq!(policy.time_to_live(), None);
        assert_eq!(policy.target_size(), None);
        assert!(!policy.touch_on_get());
        assert!(!policy.touch_on_iterate());

        map.insert('a', "Alice");
        assert_eq!(map.get(&'a'), Some("Alice"));

        let map = ExpiringMapBuilder::new()
            .name("lookup-rows")
            .time_to_live(Duration::from_secs(45 * 60))
            .touch_on_get(true)
            .touch_on_iterate(true)
            .target_size(100)
            .segments(5)
            .build();

        let policy = map.policy();
        assert_eq!(policy.time_to_live(), Some(Duration::from_secs(45 * 60)));
        assert_eq!(policy.target_size(), Some(100));
        assert!(policy.touch_on_get());
        assert!(policy.touch_on_iterate());
        assert_eq!(policy.num_segments(), 8);
        assert_eq!(map.name(), Some("lookup-rows"));

        map.insert('b', "Bob");
        assert_eq!(map.get(&'b'), Some("Bob"));
    }

    #[test]
    fn zero_sentinels_disable_expiry_and_bounding() {
        let map: crate::sync::ExpiringMap<u32, u32> = ExpiringMapBuilder::new()
            .time_to_live(Duration::ZERO)
            .target_size(0)
            .build();

        let policy = map.policy();
        assert_eq!(policy.time_to_live(), None);
        assert_eq!(policy.target_size(), None);
    }

    #[test]
    fn try_build_rejects_absurd_time_to_live() {
        let result = ExpiringMapBuilder::<char, String>::new()
            .time_to_live(Duration::MAX)
            .try_build();
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "time_to_live is longer than 1000 years")]
    fn build_panics_on_absurd_time_to_live() {
        let _map = ExpiringMapBuilder::<char, String>::new()
            .time_to_live(Duration::MAX)
            .build();
    }

    #[test]
    fn build_with_alternative_hasher() {
        let map = ExpiringMapBuilder::new().build_with_hasher(ahash::RandomState::default());

        map.insert(1u32, "one");
        assert_eq!(map.get(&1), Some("one"));
    }
}
