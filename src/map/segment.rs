use std::{
    borrow::Borrow,
    collections::{hash_map, HashMap},
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// A concurrent hash map divided into independently locked segments.
///
/// All operations take `&self`. Read-only operations take the segment's read
/// lock; operations passing a mutating closure take the write lock for the
/// whole critical section, so the closure's observation of the current entry
/// and the resulting mutation are a single atomic step.
pub(crate) struct SegmentedHashMap<K, V, S> {
    segments: Box<[CachePadded<RwLock<HashMap<Arc<K>, V, S>>>]>,
    segment_shift: u32,
    build_hasher: S,
}

impl<K, V, S> SegmentedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Creates a map with `num_segments` segments (rounded up to a power of
    /// two) and a total initial capacity of `initial_capacity`.
    pub(crate) fn with_num_segments_capacity_and_hasher(
        num_segments: usize,
        initial_capacity: usize,
        build_hasher: S,
    ) -> Self {
        assert!(num_segments > 0);

        let num_segments = num_segments.next_power_of_two();
        let segment_capacity = (initial_capacity + num_segments - 1) / num_segments;
        let segments = (0..num_segments)
            .map(|_| {
                CachePadded::new(RwLock::new(HashMap::with_capacity_and_hasher(
                    segment_capacity,
                    build_hasher.clone(),
                )))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            segments,
            segment_shift: 64 - num_segments.trailing_zeros(),
            build_hasher,
        }
    }

    pub(crate) fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns the raw number of entries, counting every entry physically
    /// present.
    pub(crate) fn len(&self) -> usize {
        self.segments.iter().map(|s| s.read().len()).sum()
    }

    pub(crate) fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Applies `with_entry` to the entry for `key`, if present.
    pub(crate) fn get_key_value_and<Q, F, T>(&self, key: &Q, hash: u64, with_entry: F) -> Option<T>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&Arc<K>, &V) -> T,
    {
        let map = self.segment_for_hash(hash).read();
        map.get_key_value(key).map(|(k, v)| with_entry(k, v))
    }

    /// Unconditionally inserts `value`, applying `with_replaced` to the entry
    /// it displaced, if any.
    pub(crate) fn insert_entry_and<F, T>(
        &self,
        key: Arc<K>,
        hash: u64,
        value: V,
        with_replaced: F,
    ) -> Option<T>
    where
        F: FnOnce(V) -> T,
    {
        let mut map = self.segment_for_hash(hash).write();
        map.insert(key, value).map(with_replaced)
    }

    /// Inserts `value` if `key` is absent. If an entry is already present,
    /// applies `with_existing` to it, then replaces it with `value` only when
    /// `should_replace` says so. Returns `None` exactly when `value` was
    /// inserted into an empty slot.
    pub(crate) fn insert_if_and<F, G, T>(
        &self,
        key: Arc<K>,
        hash: u64,
        value: V,
        should_replace: F,
        with_existing: G,
    ) -> Option<T>
    where
        F: FnOnce(&Arc<K>, &V) -> bool,
        G: FnOnce(&Arc<K>, &V) -> T,
    {
        let mut map = self.segment_for_hash(hash).write();
        match map.entry(key) {
            hash_map::Entry::Occupied(mut occupied) => {
                let result = with_existing(occupied.key(), occupied.get());
                if should_replace(occupied.key(), occupied.get()) {
                    occupied.insert(value);
                }
                Some(result)
            }
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(value);
                None
            }
        }
    }

    /// Replaces the entry for `key` with `value` when `should_replace` says
    /// so. Absent keys are left absent. `with_existing` observes the entry
    /// being judged, before any replacement.
    pub(crate) fn update_entry_if_and<Q, F, G, T>(
        &self,
        key: &Q,
        hash: u64,
        value: V,
        should_replace: F,
        with_existing: G,
    ) -> Option<T>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&Arc<K>, &V) -> bool,
        G: FnOnce(&Arc<K>, &V) -> T,
    {
        let mut map = self.segment_for_hash(hash).write();
        let (replace, result) = {
            let (k, v) = map.get_key_value(key)?;
            (should_replace(k, v), with_existing(k, v))
        };
        if replace {
            if let Some(slot) = map.get_mut(key) {
                *slot = value;
            }
        }
        Some(result)
    }

    /// Removes the entry for `key` when `condition` says so, applying
    /// `with_previous` to the removed key and value.
    pub(crate) fn remove_entry_if_and<Q, F, G, T>(
        &self,
        key: &Q,
        hash: u64,
        condition: F,
        with_previous: G,
    ) -> Option<T>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&Arc<K>, &V) -> bool,
        G: FnOnce(Arc<K>, V) -> T,
    {
        let mut map = self.segment_for_hash(hash).write();
        let remove = {
            let (k, v) = map.get_key_value(key)?;
            condition(k, v)
        };
        if remove {
            map.remove_entry(key).map(|(k, v)| with_previous(k, v))
        } else {
            None
        }
    }

    /// Returns a snapshot of the keys in the given segment, or `None` if the
    /// segment index is out of range.
    pub(crate) fn keys(&self, segment: usize) -> Option<Vec<Arc<K>>> {
        self.segments
            .get(segment)
            .map(|s| s.read().keys().map(Arc::clone).collect())
    }

    /// Returns `true` if any entry satisfies `pred`. Segments are visited one
    /// at a time, so the scan never holds more than one lock.
    pub(crate) fn any_entry<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&Arc<K>, &V) -> bool,
    {
        self.segments
            .iter()
            .any(|s| s.read().iter().any(|(k, v)| pred(k, v)))
    }

    /// Applies `f` to every raw entry, one segment at a time.
    pub(crate) fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<K>, &V),
    {
        for segment in self.segments.iter() {
            for (k, v) in segment.read().iter() {
                f(k, v);
            }
        }
    }

    pub(crate) fn clear(&self) {
        for segment in self.segments.iter() {
            segment.write().clear();
        }
    }

    #[inline]
    fn segment_for_hash(&self, hash: u64) -> &RwLock<HashMap<Arc<K>, V, S>> {
        let index = if self.segments.len() == 1 {
            0
        } else {
            (hash >> self.segment_shift) as usize
        };
        &self.segments[index]
    }
}
