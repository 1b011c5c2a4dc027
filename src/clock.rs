//! Time source for the `validFrom` field on enclave requests.

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstracts `Clock.now` so protocol tests can pin a fixed time instead
/// of reading the system clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Default `Clock`, backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before Unix epoch").as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_a_plausible_unix_time() {
        // 2020-01-01T00:00:00Z, a sanity floor rather than an exact check.
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
