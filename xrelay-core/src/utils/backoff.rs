use std::time::Duration;

/// Largest exponent used by [`retry_delay`] (2^11 times the base).
pub const MAX_RETRY_EXPONENT: u32 = 11;

/// Returns how long a listener waits before the next poll after
/// `consecutive_failures` failed polls in a row.
///
/// The first failure waits `base`, every further one doubles it, and the
/// result never exceeds `max`.
pub fn listener_backoff(base: Duration, max: Duration, consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(MAX_RETRY_EXPONENT);
    base.saturating_mul(1 << exponent).min(max)
}

/// Delay before delivery attempt `attempt + 1`, using exponential backoff
/// `base * 2^attempt` capped at `2^MAX_RETRY_EXPONENT`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.min(MAX_RETRY_EXPONENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_calculation() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 10), Duration::from_secs(1024));
        assert_eq!(retry_delay(base, 11), Duration::from_secs(2048));
        // Max capped at 11
        assert_eq!(retry_delay(base, 12), Duration::from_secs(2048));
        assert_eq!(retry_delay(base, 100), Duration::from_secs(2048));
    }

    #[test]
    fn test_listener_backoff_grows_and_caps() {
        let base = Duration::from_secs(15);
        let max = Duration::from_secs(120);
        assert_eq!(listener_backoff(base, max, 1), Duration::from_secs(15));
        assert_eq!(listener_backoff(base, max, 2), Duration::from_secs(30));
        assert_eq!(listener_backoff(base, max, 3), Duration::from_secs(60));
        assert_eq!(listener_backoff(base, max, 4), Duration::from_secs(120));
        assert_eq!(listener_backoff(base, max, 40), Duration::from_secs(120));
    }
}
