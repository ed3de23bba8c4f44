//! Execution-unit resolution
//!
//! Each thread is assigned a unit id the first time it records a
//! measurement. Ids are handed out round-robin and cached in TLS, so a
//! thread keeps writing the same counter shard for its whole lifetime.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_UNIT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static UNIT_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Unit id of the calling thread
#[inline]
pub fn current() -> usize {
    UNIT_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }
        let id = NEXT_UNIT.fetch_add(1, Ordering::Relaxed);
        cell.set(Some(id));
        id
    })
}

/// Default number of counter shards
pub fn default_unit_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable_per_thread() {
        let a = current();
        let b = current();
        assert_eq!(a, b);
    }

    #[test]
    fn test_threads_get_distinct_units() {
        let here = current();
        let there = std::thread::spawn(current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_default_unit_count_positive() {
        assert!(default_unit_count() >= 1);
    }
}
