//! Global fast-path gate
//!
//! Two switches checked on every measurement. `enabled` is the primary
//! switch for the whole subsystem; `monitoring` is on when the default
//! monitor has a nonzero period or diagnostic capture enabled. With
//! `enabled` off the hot path returns before touching any counter.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct FastPathGate {
    enabled: AtomicBool,
    monitoring: AtomicBool,
}

impl FastPathGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            monitoring: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the primary switch, returning the previous state
    pub fn set_enabled(&self, on: bool) -> bool {
        self.enabled.swap(on, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    pub fn set_monitoring(&self, on: bool) -> bool {
        self.monitoring.swap(on, Ordering::AcqRel)
    }

    /// Both switches on: threshold checks and captures may run
    #[inline]
    pub fn is_live(&self) -> bool {
        self.is_enabled() && self.is_monitoring()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_off() {
        let gate = FastPathGate::default();
        assert!(!gate.is_enabled());
        assert!(!gate.is_monitoring());
        assert!(!gate.is_live());
    }

    #[test]
    fn test_live_requires_both() {
        let gate = FastPathGate::new(true);
        assert!(!gate.is_live());
        assert!(!gate.set_monitoring(true));
        assert!(gate.is_live());
        assert!(gate.set_enabled(false));
        assert!(!gate.is_live());
        assert!(gate.is_monitoring());
    }
}
