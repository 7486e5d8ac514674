use std::time::Duration;

use super::error::ConfigError;

const YEAR_SECONDS: u64 = 365 * 24 * 3600;

pub(crate) fn ensure_time_to_live(time_to_live: Option<Duration>) -> Result<(), ConfigError> {
    let max_duration = Duration::from_secs(1_000 * YEAR_SECONDS);
    if let Some(d) = time_to_live {
        if d > max_duration {
            return Err(ConfigError::TimeToLiveTooLong);
        }
    }
    Ok(())
}
