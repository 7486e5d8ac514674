use std::time::Duration;

use crate::common::time::{AtomicInstant, Instant};

/// A stored value plus its recency bookkeeping.
///
/// The value is immutable for the lifetime of the entry; `insert`, successful
/// replaces, and `insert_if_absent` over a stale slot all install a *new*
/// entry with a fresh sequence number rather than mutating this one. Only the
/// touch timestamp mutates in place, and only forwards.
#[derive(Debug)]
pub(crate) struct ValueEntry<V> {
    value: V,
    last_touched: AtomicInstant,
    sequence: u64,
}

impl<V> ValueEntry<V> {
    pub(crate) fn new(value: V, timestamp: Instant, sequence: u64) -> Self {
        Self {
            value,
            last_touched: AtomicInstant::new(timestamp),
            sequence,
        }
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    /// The entry's position in the global insertion order; breaks ties between
    /// entries touched at the same instant.
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn last_touched(&self) -> Instant {
        self.last_touched.instant()
    }

    /// Resets the entry's recency clock to `now`. Touching never moves the
    /// clock backwards.
    pub(crate) fn touch(&self, now: Instant) {
        self.last_touched.advance_to(now);
    }

    /// Returns `true` when the time since the last touch has reached
    /// `time_to_live`. `None` means time-based expiry is disabled and nothing
    /// ever expires.
    pub(crate) fn is_expired(&self, now: Instant, time_to_live: Option<Duration>) -> bool {
        match time_to_live {
            None => false,
            Some(ttl) => now.saturating_duration_since(self.last_touched()) >= ttl,
        }
    }
}
