use relay_config_and_utils::ResendConfig;
use std::time::Duration;

/// Delay before the next resend: `min_interval * 2^attempts`, capped at
/// `max_interval`.
///
/// | attempts | delay (defaults) |
/// |----------|------------------|
/// | 0        | 2s               |
/// | 1        | 4s               |
/// | 2        | 8s               |
/// | 7+       | 256s (capped)    |
pub fn compute_backoff(attempts: u32, config: &ResendConfig) -> Duration {
    let min_ms = config.min_interval_ms;
    let max_ms = config.max_interval_ms.max(min_ms);
    let multiplier = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    Duration::from_millis(min_ms.saturating_mul(multiplier).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_ms: u64, max_ms: u64) -> ResendConfig {
        ResendConfig {
            min_interval_ms: min_ms,
            max_interval_ms: max_ms,
            max_attempts: 5,
        }
    }

    #[test]
    fn compute_backoff_doubles_and_caps() {
        let config = config(2000, 10_000);
        assert_eq!(compute_backoff(0, &config), Duration::from_secs(2));
        assert_eq!(compute_backoff(1, &config), Duration::from_secs(4));
        assert_eq!(compute_backoff(2, &config), Duration::from_secs(8));
        assert_eq!(compute_backoff(3, &config), Duration::from_secs(10));
        assert_eq!(compute_backoff(30, &config), Duration::from_secs(10));
    }

    #[test]
    fn compute_backoff_large_attempt_count_saturates() {
        let config = config(2000, 256_000);
        assert_eq!(compute_backoff(64, &config), Duration::from_secs(256));
        assert_eq!(compute_backoff(u32::MAX, &config), Duration::from_secs(256));
    }

    #[test]
    fn compute_backoff_max_below_min_uses_min() {
        let config = config(5000, 1000);
        assert_eq!(compute_backoff(3, &config), Duration::from_secs(5));
    }
}
