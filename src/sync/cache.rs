use super::{entry::ValueEntry, ExpiringMapBuilder, Iter};
use crate::{
    common::time::{Clock, Instant},
    map::SegmentedHashMap,
    notification::{EvictionListener, RemovalNotifier},
    policy::Policy,
};

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use triomphe::Arc as TrioArc;

type Store<K, V, S> = SegmentedHashMap<K, TrioArc<ValueEntry<V>>, S>;

/// A thread-safe in-memory map whose entries expire a fixed time after they
/// were last touched, optionally bounded to a target number of entries.
///
/// `ExpiringMap` supports full concurrency of retrievals and a high expected
/// concurrency for updates. Entries are stored in a hash table divided into
/// independently locked segments; compound operations such as
/// [`insert_if_absent`](#method.insert_if_absent) and
/// [`replace_if_equals`](#method.replace_if_equals) are atomic per key.
///
/// # Expiry is lazy
///
/// There is no background thread. An entry whose time to live has elapsed
/// simply becomes invisible to `get`, `contains_key`, `contains_value`,
/// `is_empty` and iteration; its storage is reclaimed when it is overwritten,
/// removed, or evicted by the size bound. As a consequence
/// [`len`](#method.len) deliberately reports the *raw* entry count, stale
/// entries included; see the method documentation.
///
/// # Touching
///
/// Every entry carries the instant at which it was last *touched*. Inserts and
/// successful replaces always touch. Whether reads touch is decided at
/// construction time: with `touch_on_get`, a successful `get` resets the
/// entry's clock; with `touch_on_iterate`, so does visiting the entry during
/// iteration. `contains_key` and `contains_value` never touch, regardless of
/// configuration. Touch recency also drives the size bound: when an insert
/// pushes the raw entry count over the target size, the least-recently-touched
/// entries are evicted until the bound holds again.
///
/// # Examples
///
/// Here's an example of reading and updating the map from multiple threads:
///
/// ```rust
/// use expiry_map::sync::ExpiringMap;
///
/// use std::{thread, time::Duration};
///
/// fn value(n: usize) -> String {
///     format!("value {n}")
/// }
///
/// const NUM_THREADS: usize = 16;
/// const NUM_KEYS_PER_THREAD: usize = 64;
///
/// // Entries expire ten minutes after their last touch.
/// let map = ExpiringMap::with_time_to_live(Duration::from_secs(10 * 60));
///
/// // To share the same map across the threads, clone it. This is a cheap
/// // operation.
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|i| {
///         let my_map = map.clone();
///         let start = i * NUM_KEYS_PER_THREAD;
///         let end = (i + 1) * NUM_KEYS_PER_THREAD;
///
///         thread::spawn(move || {
///             // Insert 64 entries. (NUM_KEYS_PER_THREAD = 64)
///             for key in start..end {
///                 my_map.insert(key, value(key));
///                 // get() returns Option<String>, a clone of the stored value.
///                 assert_eq!(my_map.get(&key), Some(value(key)));
///             }
///
///             // Remove every 4 element of the inserted entries.
///             for key in (start..end).step_by(4) {
///                 my_map.remove(&key);
///             }
///         })
///     })
///     .collect();
///
/// // Wait for all threads to complete.
/// threads.into_iter().for_each(|t| t.join().expect("Failed"));
///
/// // Verify the result.
/// for key in 0..(NUM_THREADS * NUM_KEYS_PER_THREAD) {
///     if key % 4 == 0 {
///         assert_eq!(map.get(&key), None);
///     } else {
///         assert_eq!(map.get(&key), Some(value(key)));
///     }
/// }
/// ```
///
/// # Avoiding to clone the value at `get`
///
/// The return type of `get` is `Option<V>` instead of `Option<&V>`. Every time
/// `get` is called for an existing key, it creates a clone of the stored value
/// `V` and returns it. This is because the map allows concurrent updates from
/// threads, so a value stored in it can be dropped or replaced at any time by
/// any other thread; `get` cannot return a reference `&V` as it is impossible
/// to guarantee the value outlives the reference.
///
/// If you want to store values that will be expensive to clone, wrap them by
/// `std::sync::Arc` before storing in the map. [`Arc`][rustdoc-std-arc] is a
/// thread-safe reference-counted pointer and its `clone()` method is cheap.
///
/// [rustdoc-std-arc]: https://doc.rust-lang.org/stable/std/sync/struct.Arc.html
///
/// # Sharing the map across threads
///
/// To share the map across threads, clone it and pass the clone to the other
/// thread. Cloning only creates a reference-counted pointer to the shared
/// internal state.
///
/// # Hashing Algorithm
///
/// By default, `ExpiringMap` uses a hashing algorithm selected to provide
/// resistance against HashDoS attacks. It will be the same one used by
/// `std::collections::HashMap`, which is currently SipHash 1-3.
///
/// The hashing algorithm can be replaced on a per-map basis using the
/// [`build_with_hasher`][build-with-hasher-method] method of the
/// `ExpiringMapBuilder`.
///
/// [build-with-hasher-method]: ./struct.ExpiringMapBuilder.html#method.build_with_hasher
///
pub struct ExpiringMap<K, V, S = RandomState> {
    inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for ExpiringMap<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, S> fmt::Debug for ExpiringMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("name", &self.inner.name)
            .field("raw_len", &self.inner.store.len())
            .field("time_to_live", &self.inner.time_to_live)
            .field("target_size", &self.inner.target_size)
            .finish()
    }
}

impl<K, V> ExpiringMap<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs an unbounded `ExpiringMap<K, V>` whose entries expire
    /// `time_to_live` after insertion. Reads do not refresh entries; a zero
    /// duration disables expiry entirely.
    ///
    /// To adjust various configuration knobs such as the touch flags or the
    /// target size, use the [`ExpiringMapBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.ExpiringMapBuilder.html
    ///
    /// # Panics
    ///
    /// Panics if `time_to_live` is longer than 1000 years.
    pub fn with_time_to_live(time_to_live: Duration) -> Self {
        Self::builder().time_to_live(time_to_live).build()
    }

    /// Constructs an `ExpiringMap<K, V>` holding at most `target_size` raw
    /// entries, evicting the least-recently-touched entry once the bound is
    /// exceeded. Reads refresh recency (`touch_on_get` is enabled), so hot
    /// entries survive and cold ones are evicted. `time_to_live` may be zero
    /// to disable time-based expiry.
    ///
    /// To observe evictions, attach a listener with the
    /// [`ExpiringMapBuilder`][builder-struct] instead.
    ///
    /// [builder-struct]: ./struct.ExpiringMapBuilder.html
    ///
    /// # Panics
    ///
    /// Panics if `time_to_live` is longer than 1000 years.
    pub fn bounded(time_to_live: Duration, target_size: usize) -> Self {
        Self::builder()
            .time_to_live(time_to_live)
            .touch_on_get(true)
            .target_size(target_size)
            .build()
    }

    /// Returns an [`ExpiringMapBuilder`][builder-struct], which can build an
    /// `ExpiringMap` with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.ExpiringMapBuilder.html
    pub fn builder() -> ExpiringMapBuilder<K, V> {
        ExpiringMapBuilder::default()
    }
}

impl<K, V, S> ExpiringMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_everything(
        name: Option<String>,
        time_to_live: Option<Duration>,
        touch_on_get: bool,
        touch_on_iterate: bool,
        target_size: Option<usize>,
        initial_capacity: Option<usize>,
        num_segments: usize,
        eviction_listener: Option<EvictionListener<K, V>>,
        build_hasher: S,
    ) -> Self {
        let store = SegmentedHashMap::with_num_segments_capacity_and_hasher(
            num_segments,
            initial_capacity.unwrap_or_default(),
            build_hasher,
        );
        let notifier =
            eviction_listener.map(|listener| RemovalNotifier::new(listener, name.clone()));

        Self {
            inner: Arc::new(Inner {
                name,
                store,
                time_to_live,
                touch_on_get,
                touch_on_iterate,
                target_size,
                sequence: AtomicU64::new(0),
                notifier,
                clock: RwLock::new(Clock::default()),
            }),
        }
    }

    /// Returns a _clone_ of the value corresponding to the key, or `None` when
    /// the key is absent or its entry has expired.
    ///
    /// When the map was built with `touch_on_get`, the successful lookup
    /// refreshes the entry's recency.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and
    /// `Eq` on the borrowed form _must_ match those for the key type.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_with_touch(key, self.inner.touch_on_get)
    }

    /// Returns `true` when a live entry exists for the key. Never touches the
    /// entry, regardless of configuration.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = &self.inner;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        inner
            .store
            .get_key_value_and(key, hash, |_, entry| {
                !entry.is_expired(now, inner.time_to_live)
            })
            .unwrap_or(false)
    }

    /// Returns `true` when any live entry holds the given value. Scans the raw
    /// entries, treating expired ones as absent, and never touches.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let inner = &self.inner;
        let now = inner.current_time();
        inner.store.any_entry(|_, entry| {
            !entry.is_expired(now, inner.time_to_live) && entry.value() == value
        })
    }

    /// Returns `true` when the map holds no live entry.
    ///
    /// Unlike [`len`](#method.len), this scans past stale entries, so a map
    /// whose every entry has expired is empty while its `len` is still
    /// nonzero.
    pub fn is_empty(&self) -> bool {
        let inner = &self.inner;
        let now = inner.current_time();
        !inner
            .store
            .any_entry(|_, entry| !entry.is_expired(now, inner.time_to_live))
    }

    /// Returns the *raw* number of entries: every entry physically present,
    /// whether or not it has expired.
    ///
    /// This is intentional: expiry is lazy, and `len` reports retained
    /// storage, not visibility. The count never shrinks merely because time
    /// passed; it shrinks when entries are removed, overwritten, cleared or
    /// evicted. Use [`is_empty`](#method.is_empty),
    /// [`contains_key`](#method.contains_key) or iteration to observe
    /// liveness.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Inserts a key-value pair, unconditionally replacing any previous entry
    /// (expired or not) with a freshly touched one.
    ///
    /// Returns the previous *live* value; a replaced entry that had already
    /// expired reports as `None`.
    ///
    /// When the map is size-bounded and this insert pushes the raw entry count
    /// over the target, the least-recently-touched entries are evicted (and
    /// the eviction listener invoked) before this method returns.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let inner = &self.inner;
        let hash = inner.store.hash(&key);
        let key = Arc::new(key);
        let now = inner.current_time();
        let entry = TrioArc::new(ValueEntry::new(value, now, inner.next_sequence()));

        let previous = inner
            .store
            .insert_entry_and(key, hash, entry, |replaced| {
                (!replaced.is_expired(now, inner.time_to_live))
                    .then(|| replaced.value().clone())
            })
            .flatten();

        self.evict_to_target();
        previous
    }

    /// Inserts every pair from `entries`, as if by repeated
    /// [`insert`](#method.insert) calls. Each insert applies the size bound
    /// before the next pair is stored.
    pub fn insert_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    /// Inserts the pair only when no live entry exists for the key, returning
    /// `None` in that case. When a live entry exists, the map is left
    /// unchanged (the existing entry is *not* touched) and its value is
    /// returned.
    ///
    /// An expired entry counts as absent: it is replaced by a fresh one and
    /// `None` is returned. The whole check-then-insert is atomic.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        let inner = &self.inner;
        let ttl = inner.time_to_live;
        let hash = inner.store.hash(&key);
        let key = Arc::new(key);
        let now = inner.current_time();
        let entry = TrioArc::new(ValueEntry::new(value, now, inner.next_sequence()));

        inner
            .store
            .insert_if_and(
                key,
                hash,
                entry,
                |_, existing| existing.is_expired(now, ttl),
                |_, existing| (!existing.is_expired(now, ttl)).then(|| existing.value().clone()),
            )
            .flatten()
    }

    /// Replaces the value of a live entry, touching it and returning the
    /// previous value. When the key is absent or its entry has expired, the
    /// map is left unchanged and `None` is returned. Atomic.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = &self.inner;
        let ttl = inner.time_to_live;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        let entry = TrioArc::new(ValueEntry::new(value, now, inner.next_sequence()));

        inner
            .store
            .update_entry_if_and(
                key,
                hash,
                entry,
                |_, existing| !existing.is_expired(now, ttl),
                |_, existing| (!existing.is_expired(now, ttl)).then(|| existing.value().clone()),
            )
            .flatten()
    }

    /// Replaces the value of a live entry only when its current value equals
    /// `expected`, touching it on success. Returns whether the swap happened.
    /// Atomic.
    pub fn replace_if_equals<Q>(&self, key: &Q, expected: &V, value: V) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let inner = &self.inner;
        let ttl = inner.time_to_live;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        let entry = TrioArc::new(ValueEntry::new(value, now, inner.next_sequence()));

        inner
            .store
            .update_entry_if_and(
                key,
                hash,
                entry,
                |_, existing| !existing.is_expired(now, ttl) && existing.value() == expected,
                |_, existing| !existing.is_expired(now, ttl) && existing.value() == expected,
            )
            .unwrap_or(false)
    }

    /// Removes the entry for the key, returning its value when it was still
    /// live. A stale entry is purged as a side effect but reports as `None`,
    /// exactly like an absent key.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = &self.inner;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        inner
            .store
            .remove_entry_if_and(
                key,
                hash,
                |_, _| true,
                |_, entry| {
                    (!entry.is_expired(now, inner.time_to_live)).then(|| entry.value().clone())
                },
            )
            .flatten()
    }

    /// Removes the entry for the key only when it is live and its value equals
    /// `expected`. Returns whether the removal happened. Atomic.
    pub fn remove_if_equals<Q>(&self, key: &Q, expected: &V) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let inner = &self.inner;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        inner
            .store
            .remove_entry_if_and(
                key,
                hash,
                |_, entry| {
                    !entry.is_expired(now, inner.time_to_live) && entry.value() == expected
                },
                |_, _| (),
            )
            .is_some()
    }

    /// Discards all entries, stale ones included. The eviction listener is not
    /// invoked.
    pub fn clear(&self) {
        self.inner.store.clear();
    }

    /// Creates a fresh iterator over the live entries, yielding
    /// `(Arc<K>, V)` pairs. See [`Iter`](./struct.Iter.html) for its
    /// consistency and touch behavior.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }

    /// Returns the immutable configuration of this map.
    pub fn policy(&self) -> Policy {
        let inner = &self.inner;
        Policy::new(
            inner.time_to_live,
            inner.touch_on_get,
            inner.touch_on_iterate,
            inner.target_size,
            inner.store.num_segments(),
        )
    }

    /// Returns the name of this map, when one was set at build time.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub(crate) fn visiting_get(&self, key: &Arc<K>) -> Option<V> {
        self.get_with_touch(&**key, self.inner.touch_on_iterate)
    }

    pub(crate) fn segment_keys(&self, segment: usize) -> Option<Vec<Arc<K>>> {
        self.inner.store.keys(segment)
    }

    fn get_with_touch<Q>(&self, key: &Q, touch: bool) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = &self.inner;
        let now = inner.current_time();
        let hash = inner.store.hash(key);
        let entry = inner
            .store
            .get_key_value_and(key, hash, |_, entry| TrioArc::clone(entry))?;

        if entry.is_expired(now, inner.time_to_live) {
            return None;
        }
        if touch {
            entry.touch(now);
        }
        Some(entry.value().clone())
    }

    /// Walks the raw entries from the least-recently-touched end and removes
    /// them until the raw count is back at the target size. Runs on the
    /// inserting thread; the listener is invoked outside all segment locks.
    fn evict_to_target(&self) {
        let inner = &self.inner;
        let Some(target) = inner.target_size else {
            return;
        };

        loop {
            let excess = inner.store.len().saturating_sub(target);
            if excess == 0 {
                return;
            }

            let mut evicted = false;
            for victim in self.eviction_victims(excess) {
                // The sequence guard makes sure an entry refreshed by a
                // concurrent insert or replace is not removed on the strength
                // of this thread's stale snapshot.
                let removed = inner.store.remove_entry_if_and(
                    &*victim.key,
                    inner.store.hash(&*victim.key),
                    |_, entry| entry.sequence() == victim.sequence,
                    |key, entry| (key, entry.value().clone()),
                );
                if let Some((key, value)) = removed {
                    evicted = true;
                    if let Some(notifier) = &inner.notifier {
                        notifier.notify(key, value);
                    }
                }
            }

            // Every candidate was refreshed or removed by another thread; let
            // that thread's own eviction pass finish the job.
            if !evicted {
                return;
            }
        }
    }

    fn eviction_victims(&self, excess: usize) -> SmallVec<[EvictionCandidate<K>; 4]> {
        let store = &self.inner.store;
        let mut candidates = Vec::with_capacity(store.len());
        store.for_each_entry(|key, entry| {
            candidates.push(EvictionCandidate {
                key: Arc::clone(key),
                last_touched: entry.last_touched(),
                sequence: entry.sequence(),
            });
        });
        candidates.sort_unstable_by_key(|c| (c.last_touched, c.sequence));
        candidates.truncate(excess);
        candidates.into_iter().collect()
    }
}

impl<'a, K, V, S> IntoIterator for &'a ExpiringMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Item = (Arc<K>, V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// For unit tests.
#[cfg(test)]
impl<K, V, S> ExpiringMap<K, V, S> {
    pub(crate) fn set_expiration_clock(&self, clock: Clock) {
        *self.inner.clock.write() = clock;
    }
}

struct Inner<K, V, S> {
    name: Option<String>,
    store: Store<K, V, S>,
    time_to_live: Option<Duration>,
    touch_on_get: bool,
    touch_on_iterate: bool,
    target_size: Option<usize>,
    sequence: AtomicU64,
    notifier: Option<RemovalNotifier<K, V>>,
    clock: RwLock<Clock>,
}

impl<K, V, S> Inner<K, V, S> {
    #[inline]
    fn current_time(&self) -> Instant {
        self.clock.read().now()
    }

    #[inline]
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

struct EvictionCandidate<K> {
    key: Arc<K>,
    last_touched: Instant,
    sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::ExpiringMap;
    use crate::common::time::Clock;

    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};

    const TTL: Duration = Duration::from_secs(10);

    fn ttl_map(touch_on_get: bool, touch_on_iterate: bool) -> (ExpiringMap<u32, &'static str>, Arc<crate::common::time::Mock>) {
        let map = ExpiringMap::builder()
            .time_to_live(TTL)
            .touch_on_get(touch_on_get)
            .touch_on_iterate(touch_on_iterate)
            .build();
        let (clock, mock) = Clock::mock();
        map.set_expiration_clock(clock);
        (map, mock)
    }

    fn listening_map(
        target_size: usize,
        touch_on_get: bool,
        time_to_live: Duration,
    ) -> (
        ExpiringMap<u32, &'static str>,
        Arc<Mutex<Vec<u32>>>,
        Arc<crate::common::time::Mock>,
    ) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&evicted);
        let map = ExpiringMap::builder()
            .time_to_live(time_to_live)
            .touch_on_get(touch_on_get)
            .target_size(target_size)
            .eviction_listener(move |key, _value| log.lock().push(*key))
            .build();
        let (clock, mock) = Clock::mock();
        map.set_expiration_clock(clock);
        (map, evicted, mock)
    }

    #[test]
    fn basic_single_thread() {
        let map = ExpiringMap::builder().build();

        map.insert("a", "alice");
        map.insert("b", "bob");
        assert_eq!(map.get(&"a"), Some("alice"));
        assert_eq!(map.get(&"b"), Some("bob"));
        assert_eq!(map.len(), 2);
        assert!(!map.is_empty());
        assert!(map.contains_key(&"a"));
        assert!(map.contains_value(&"alice"));
        assert!(!map.contains_key(&"c"));
        assert!(!map.contains_value(&"cindy"));

        assert_eq!(map.remove(&"a"), Some("alice"));
        assert_eq!(map.remove(&"a"), None);
        assert_eq!(map.get(&"a"), None);
        assert_eq!(map.len(), 1);

        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn basic_multi_threads() {
        let num_threads = 4;
        let map = ExpiringMap::with_time_to_live(Duration::from_secs(60));

        let handles = (0..num_threads)
            .map(|id| {
                let map = map.clone();
                std::thread::spawn(move || {
                    map.insert(10, format!("{id}-100"));
                    map.get(&10);
                    map.insert(20, format!("{id}-200"));
                    map.remove(&10);
                })
            })
            .collect::<Vec<_>>();

        handles.into_iter().for_each(|h| h.join().expect("Failed"));

        assert!(map.get(&10).is_none());
        assert!(map.get(&20).is_some());
    }

    #[test]
    fn expiry_is_lazy_and_len_is_raw() {
        let (map, mock) = ttl_map(false, false);

        map.insert(1, "one");
        assert_eq!(map.get(&1), Some("one"));
        assert_eq!(map.len(), 1);

        mock.increment(TTL + Duration::from_millis(1));

        // The entry is invisible everywhere...
        assert_eq!(map.get(&1), None);
        assert!(!map.contains_key(&1));
        assert!(!map.contains_value(&"one"));
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);

        // ...but its storage is still retained.
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn reads_before_the_deadline_see_the_value() {
        let (map, mock) = ttl_map(false, false);

        map.insert(1, "one");
        mock.increment(TTL / 2);
        assert_eq!(map.get(&1), Some("one"));
        assert!(map.contains_key(&1));

        // Without touch_on_get the read did not extend anything.
        mock.increment(TTL / 2);
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn touch_on_get_keeps_entries_alive() {
        let (map, mock) = ttl_map(true, false);

        map.insert(1, "one");
        for _ in 0..5 {
            mock.increment(Duration::from_secs(6));
            assert_eq!(map.get(&1), Some("one"));
        }

        // A single gap of a full TTL since the last get expires it.
        mock.increment(TTL);
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn contains_checks_never_touch() {
        // Both touch flags are enabled; contains_* must still not touch.
        let (map, mock) = ttl_map(true, true);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(6));
        assert!(map.contains_key(&1));
        assert!(map.contains_value(&"one"));

        mock.increment(Duration::from_secs(6));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn iteration_without_the_flag_never_touches() {
        let (map, mock) = ttl_map(true, false);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(6));
        assert_eq!(map.iter().count(), 1);

        mock.increment(Duration::from_secs(6));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn touch_on_iterate_extends_life_by_a_full_ttl() {
        let (map, mock) = ttl_map(false, true);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(6));
        let visited = map.iter().map(|(k, v)| (*k, v)).collect::<Vec<_>>();
        assert_eq!(visited, vec![(1, "one")]);

        // Expiry now runs from the iteration instant (t=6), not the insert.
        mock.increment(Duration::from_secs(6));
        assert_eq!(map.get(&1), Some("one"));
        mock.increment(Duration::from_secs(5));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn insert_if_absent_only_replaces_dead_entries() {
        let (map, mock) = ttl_map(false, false);

        assert_eq!(map.insert_if_absent(1, "one"), None);

        // A live entry wins, and is not touched by the attempt.
        mock.increment(Duration::from_secs(4));
        assert_eq!(map.insert_if_absent(1, "uno"), Some("one"));
        assert_eq!(map.get(&1), Some("one"));

        mock.increment(Duration::from_secs(7));
        assert_eq!(map.get(&1), None);

        // An expired entry counts as absent.
        assert_eq!(map.insert_if_absent(1, "uno"), None);
        assert_eq!(map.get(&1), Some("uno"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn replace_only_hits_live_entries() {
        let (map, mock) = ttl_map(false, false);

        // Absent key: no-op, nothing inserted.
        assert_eq!(map.replace(&1, "uno"), None);
        assert_eq!(map.len(), 0);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(6));
        assert_eq!(map.replace(&1, "uno"), Some("one"));
        assert_eq!(map.get(&1), Some("uno"));

        // The replace touched the entry at t=6, so it lives until t=16.
        mock.increment(Duration::from_secs(8));
        assert_eq!(map.get(&1), Some("uno"));
        mock.increment(Duration::from_secs(2));
        assert_eq!(map.get(&1), None);

        // An expired entry cannot be replaced.
        assert_eq!(map.replace(&1, "eins"), None);
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn replace_if_equals_compares_the_live_value() {
        let (map, mock) = ttl_map(false, false);

        map.insert(1, "one");
        assert!(!map.replace_if_equals(&1, &"wrong", "uno"));
        assert_eq!(map.get(&1), Some("one"));

        assert!(map.replace_if_equals(&1, &"one", "uno"));
        assert_eq!(map.get(&1), Some("uno"));

        mock.increment(TTL);
        assert!(!map.replace_if_equals(&1, &"uno", "eins"));
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn remove_returns_live_values_only() {
        let (map, mock) = ttl_map(false, false);

        assert_eq!(map.remove(&1), None);

        map.insert(1, "one");
        assert_eq!(map.remove(&1), Some("one"));
        assert_eq!(map.len(), 0);

        // Removing a stale entry reports as a miss, but purges the storage.
        map.insert(1, "one");
        mock.increment(TTL);
        assert_eq!(map.remove(&1), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn remove_if_equals_compares_the_live_value() {
        let (map, mock) = ttl_map(false, false);

        map.insert(1, "one");
        assert!(!map.remove_if_equals(&1, &"wrong"));
        assert_eq!(map.get(&1), Some("one"));

        assert!(map.remove_if_equals(&1, &"one"));
        assert_eq!(map.get(&1), None);

        map.insert(1, "one");
        mock.increment(TTL);
        assert!(!map.remove_if_equals(&1, &"one"));
    }

    #[test]
    fn insert_reports_the_previous_live_value() {
        let (map, mock) = ttl_map(false, false);

        assert_eq!(map.insert(1, "one"), None);
        assert_eq!(map.insert(1, "uno"), Some("one"));

        mock.increment(TTL);
        // The displaced entry had already expired.
        assert_eq!(map.insert(1, "eins"), None);
        assert_eq!(map.get(&1), Some("eins"));
    }

    #[test]
    fn filling_up_to_the_target_size_evicts_nothing() {
        let (map, evicted, _mock) = listening_map(3, false, Duration::ZERO);

        map.insert(1, "one");
        map.insert(2, "two");
        map.insert(3, "three");

        assert_eq!(map.len(), 3);
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn exceeding_the_target_size_evicts_the_coldest_entry() {
        let (map, evicted, mock) = listening_map(3, false, Duration::ZERO);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(1));
        map.insert(2, "two");
        mock.increment(Duration::from_secs(1));
        map.insert(3, "three");
        mock.increment(Duration::from_secs(1));
        map.insert(4, "four");

        assert_eq!(*evicted.lock(), vec![1]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&1), None);
        assert_eq!(map.get(&4), Some("four"));
    }

    #[test]
    fn eviction_ties_are_broken_by_insertion_order() {
        // All four inserts share one timestamp; the sequence number decides.
        let (map, evicted, _mock) = listening_map(3, false, Duration::ZERO);

        map.insert(1, "one");
        map.insert(2, "two");
        map.insert(3, "three");
        map.insert(4, "four");
        map.insert(5, "five");

        assert_eq!(*evicted.lock(), vec![1, 2]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn touching_reads_and_replaces_defer_eviction() {
        let (map, evicted, mock) = listening_map(3, true, Duration::ZERO);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(1));
        map.insert(2, "two");
        mock.increment(Duration::from_secs(1));
        map.insert(3, "three");
        mock.increment(Duration::from_secs(1));

        // Key 1 becomes the most recently touched; key 2 is now the coldest.
        assert_eq!(map.get(&1), Some("one"));
        mock.increment(Duration::from_secs(1));
        map.insert(4, "four");
        assert_eq!(*evicted.lock(), vec![2]);

        // A successful replace touches key 3, leaving key 1 the coldest.
        mock.increment(Duration::from_secs(1));
        assert_eq!(map.replace(&3, "tres"), Some("three"));
        mock.increment(Duration::from_secs(1));
        map.insert(5, "five");
        assert_eq!(*evicted.lock(), vec![2, 1]);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&3), Some("tres"));
    }

    #[test]
    fn expired_entries_are_still_eviction_candidates() {
        let (map, evicted, mock) = listening_map(2, false, TTL);

        map.insert(1, "one");
        mock.increment(Duration::from_secs(1));
        map.insert(2, "two");

        // Let both entries expire. The size accessor still counts them.
        mock.increment(Duration::from_secs(30));
        assert_eq!(map.len(), 2);
        assert!(map.is_empty());

        // The insert overflows the raw count; the stale key 1 is the victim.
        map.insert(3, "three");
        assert_eq!(*evicted.lock(), vec![1]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&3), Some("three"));
    }

    #[test]
    fn insert_all_applies_the_bound_per_pair() {
        let (map, evicted, _mock) = listening_map(2, false, Duration::ZERO);

        map.insert_all([(1, "one"), (2, "two"), (3, "three"), (4, "four")]);

        assert_eq!(map.len(), 2);
        assert_eq!(evicted.lock().len(), 2);
    }

    #[test]
    fn a_panicking_listener_cannot_resurrect_the_victim() {
        let map: ExpiringMap<u32, &'static str> = ExpiringMap::builder()
            .target_size(1)
            .eviction_listener(|_key, _value| panic!("listener failure"))
            .build();

        map.insert(1, "one");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            map.insert(2, "two");
        }));
        assert!(result.is_err());

        // The victim was removed before the listener ran.
        assert_eq!(map.get(&1), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&2), Some("two"));
    }

    #[test]
    fn clear_discards_everything_without_notifications() {
        let (map, evicted, _mock) = listening_map(10, false, Duration::ZERO);

        map.insert(1, "one");
        map.insert(2, "two");
        map.clear();

        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn each_iter_call_returns_a_fresh_snapshot() {
        let (map, mock) = ttl_map(false, false);

        map.insert(1, "one");
        map.insert(2, "two");
        mock.increment(TTL);
        map.insert(3, "three");

        let mut live = map.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        live.sort_unstable();
        assert_eq!(live, vec![3]);

        // A one-shot iterator is exhausted for good; a new call starts over.
        let mut iter = map.iter();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn iteration_tolerates_concurrent_writes() {
        let map = ExpiringMap::builder().segments(2).build();
        for i in 0..32u32 {
            map.insert(i, i);
        }

        let mut iter = map.iter();
        let first = iter.next();
        assert!(first.is_some());

        // Mutating mid-iteration must not invalidate the iterator.
        map.insert(100, 100);
        map.remove(&0);
        assert!(iter.count() > 0);
    }

    #[test]
    fn clones_share_the_same_storage() {
        let map = ExpiringMap::builder().build();
        let other = map.clone();

        map.insert(1, "one");
        assert_eq!(other.get(&1), Some("one"));

        other.remove(&1);
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn bounded_constructor_touches_on_get() {
        let map: ExpiringMap<u32, &'static str> = ExpiringMap::bounded(Duration::ZERO, 5);
        let policy = map.policy();
        assert!(policy.touch_on_get());
        assert!(!policy.touch_on_iterate());
        assert_eq!(policy.target_size(), Some(5));
        assert_eq!(policy.time_to_live(), None);

        let map: ExpiringMap<u32, &'static str> = ExpiringMap::with_time_to_live(TTL);
        let policy = map.policy();
        assert!(!policy.touch_on_get());
        assert_eq!(policy.time_to_live(), Some(TTL));
        assert_eq!(policy.target_size(), None);
    }
}
