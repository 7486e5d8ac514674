use crate::common::time::Instant;

use std::sync::atomic::{AtomicU64, Ordering};

/// `AtomicInstant` is a wrapper around `AtomicU64` that provides thread-safe
/// access to an `Instant`.
///
/// The stored instant can only move forward: `advance_to` is an atomic max, so
/// concurrent writers can never make it go backwards.
#[derive(Debug)]
pub(crate) struct AtomicInstant {
    instant: AtomicU64,
}

impl AtomicInstant {
    /// Creates a new `AtomicInstant` with the given `Instant`.
    pub(crate) fn new(timestamp: Instant) -> Self {
        Self {
            instant: AtomicU64::new(timestamp.as_nanos()),
        }
    }

    /// Returns the stored `Instant`.
    pub(crate) fn instant(&self) -> Instant {
        Instant::from_nanos(self.instant.load(Ordering::Acquire))
    }

    /// Advances the stored `Instant` to `timestamp`, unless it is already
    /// later.
    pub(crate) fn advance_to(&self, timestamp: Instant) {
        self.instant
            .fetch_max(timestamp.as_nanos(), Ordering::AcqRel);
    }
}
