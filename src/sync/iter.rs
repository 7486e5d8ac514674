use std::{
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use super::ExpiringMap;

/// Iterator visiting the live entries of an [`ExpiringMap`][map-struct] in
/// arbitrary order.
///
/// The iterator is one-shot and forward-only. It walks a per-segment snapshot
/// of the keys taken lazily as each segment is reached, and re-reads every
/// entry at visitation time: entries that expired or were removed since the
/// snapshot are skipped, so only entries live at the moment they are yielded
/// appear. Concurrent mutations never invalidate the iterator; whether they
/// are reflected depends on whether their segment was snapshotted yet.
///
/// When the map was built with `touch_on_iterate`, each yielded entry is
/// touched as a side effect of visiting it.
///
/// Call [`ExpiringMap::iter`](./struct.ExpiringMap.html#method.iter) to obtain
/// an `Iter`.
///
/// [map-struct]: ./struct.ExpiringMap.html
pub struct Iter<'i, K, V, S> {
    map: &'i ExpiringMap<K, V, S>,
    keys: Option<Vec<Arc<K>>>,
    segment_index: usize,
    is_done: bool,
}

impl<'i, K, V, S> Iter<'i, K, V, S> {
    pub(crate) fn new(map: &'i ExpiringMap<K, V, S>) -> Self {
        Self {
            map,
            keys: None,
            segment_index: 0,
            is_done: false,
        }
    }
}

impl<'i, K, V, S> Iterator for Iter<'i, K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Item = (Arc<K>, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_done {
            return None;
        }

        while let Some(key) = self.next_key() {
            if let Some(v) = self.map.visiting_get(&key) {
                return Some((key, v));
            }
        }

        self.is_done = true;
        None
    }
}

impl<'i, K, V, S> Iter<'i, K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn next_key(&mut self) -> Option<Arc<K>> {
        while let Some(keys) = self.current_keys() {
            if let key @ Some(_) = keys.pop() {
                return key;
            }
        }
        None
    }

    fn current_keys(&mut self) -> Option<&mut Vec<Arc<K>>> {
        // If keys is none or some but empty, try to get the next segment's
        // keys.
        while self.keys.as_ref().map_or(true, Vec::is_empty) {
            self.keys = Some(self.map.segment_keys(self.segment_index)?);
            self.segment_index += 1;
        }

        self.keys.as_mut()
    }
}
