//! Wall-clock helpers shared by the registry, probe, and reporter.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Milliseconds elapsed since `since_ms`, saturating at zero if the clock
/// moved backwards.
#[must_use]
pub fn elapsed_ms(since_ms: u128) -> u128 {
    now_ms().saturating_sub(since_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 0);
    }

    #[test]
    fn elapsed_ms_saturates() {
        let future = now_ms() + 60_000;
        assert_eq!(elapsed_ms(future), 0);
    }
}
