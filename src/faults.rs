// Fault injection for fallible allocations
//
// Every allocation the subsystem is allowed to fail on (counter shards,
// event monitors, active-list nodes, capture frame buffers) goes through
// `FaultInjector::check`. Arming the injector with `fail_nth(n)` makes the
// n-th subsequent allocation fail exactly once, which is how the
// degrade-to-unmonitored and rollback paths are exercised.

use crate::error::SliError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Countdown-based allocation fault injector
///
/// # Example
/// ```
/// use latscope::faults::FaultInjector;
///
/// let faults = FaultInjector::new();
/// faults.fail_nth(2);
/// assert!(faults.check("first").is_ok());
/// assert!(faults.check("second").is_err());
/// assert!(faults.check("third").is_ok());
/// ```
#[derive(Debug, Default)]
pub struct FaultInjector {
    /// Allocations left until the injected failure (0 = disarmed)
    countdown: AtomicU64,
    /// Number of failures injected so far
    injected: AtomicU64,
}

impl FaultInjector {
    /// Create a disarmed injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th allocation from now (1-based); `0` disarms
    pub fn fail_nth(&self, n: u64) {
        self.countdown.store(n, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.countdown.store(0, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.countdown.load(Ordering::Relaxed) != 0
    }

    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Account one allocation at `site`, failing it if the countdown expires
    pub fn check(&self, site: &'static str) -> Result<(), SliError> {
        let mut current = self.countdown.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Ok(());
            }
            match self.countdown.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) if current == 1 => {
                    self.injected.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(site, "injected allocation failure");
                    return Err(SliError::AllocationFailed(site));
                }
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Allocate an empty vector with room for `capacity` elements
    pub(crate) fn try_vec<T>(&self, capacity: usize, site: &'static str) -> Result<Vec<T>, SliError> {
        self.check(site)?;
        let mut v = Vec::new();
        v.try_reserve_exact(capacity)
            .map_err(|_| SliError::AllocationFailed(site))?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_never_fails() {
        let faults = FaultInjector::new();
        for _ in 0..100 {
            assert!(faults.check("site").is_ok());
        }
        assert_eq!(faults.injected(), 0);
        assert!(!faults.is_armed());
    }

    #[test]
    fn test_fail_nth_fails_once() {
        let faults = FaultInjector::new();
        faults.fail_nth(3);
        assert!(faults.is_armed());
        assert!(faults.check("a").is_ok());
        assert!(faults.check("b").is_ok());
        assert_eq!(faults.check("c"), Err(SliError::AllocationFailed("c")));
        assert!(faults.check("d").is_ok());
        assert_eq!(faults.injected(), 1);
        assert!(!faults.is_armed());
    }

    #[test]
    fn test_disarm() {
        let faults = FaultInjector::new();
        faults.fail_nth(1);
        faults.disarm();
        assert!(faults.check("a").is_ok());
    }

    #[test]
    fn test_try_vec() {
        let faults = FaultInjector::new();
        let v: Vec<u64> = faults.try_vec(64, "frames").unwrap();
        assert!(v.capacity() >= 64);
        assert!(v.is_empty());

        faults.fail_nth(1);
        let err = faults.try_vec::<u64>(64, "frames").unwrap_err();
        assert_eq!(err, SliError::AllocationFailed("frames"));
    }
}
