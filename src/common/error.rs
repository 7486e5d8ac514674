/// The error type returned when an [`ExpiringMapBuilder`][builder] is given an
/// invalid configuration.
///
/// `try_build` returns this error; `build` panics with the same message.
///
/// [builder]: ../sync/struct.ExpiringMapBuilder.html
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configured time to live cannot be represented by the map's internal
    /// clock. A zero duration is the documented way to disable time-based
    /// expiry; durations this large are always a caller bug.
    #[error("time_to_live is longer than 1000 years")]
    TimeToLiveTooLong,
}
