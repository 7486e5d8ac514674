use std::time::Duration;

pub(crate) const MAX_NANOS: u64 = u64::MAX - 1;

/// `Instant` represents a point in time since the `Clock` was created. It has
/// nanosecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Instant {
    elapsed_ns: u64,
}

impl Instant {
    pub(crate) fn from_nanos(nanos: u64) -> Instant {
        debug_assert!(nanos <= MAX_NANOS);
        Instant { elapsed_ns: nanos }
    }

    pub(crate) fn from_duration_since_clock_start(duration: Duration) -> Instant {
        Instant::from_nanos(Self::duration_to_saturating_nanoseconds(duration))
    }

    pub(crate) fn as_nanos(&self) -> u64 {
        self.elapsed_ns
    }

    /// Converts a `std::time::Duration` to nanoseconds, saturating to `MAX_NANOS`
    /// if the duration is too large. (`Duration::as_nanos` returns `u128`)
    fn duration_to_saturating_nanoseconds(duration: Duration) -> u64 {
        u64::try_from(duration.as_nanos())
            .map(|n| n.min(MAX_NANOS))
            .unwrap_or(MAX_NANOS)
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or
    /// `Duration::ZERO` if `earlier` is later than `self`.
    pub(crate) fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.saturating_sub(earlier.elapsed_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_duration_since() {
        let instant = Instant::from_nanos(100_000);
        let earlier = Instant::from_nanos(60_000);
        assert_eq!(
            instant.saturating_duration_since(earlier),
            Duration::from_nanos(40_000)
        );

        let instant = Instant::from_nanos(60_000);
        let earlier = Instant::from_nanos(100_000);
        assert_eq!(instant.saturating_duration_since(earlier), Duration::ZERO);
    }

    #[test]
    fn from_duration_saturates() {
        let instant = Instant::from_duration_since_clock_start(Duration::MAX);
        assert_eq!(instant.as_nanos(), MAX_NANOS);
    }
}
