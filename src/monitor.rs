//! Per-group event monitor
//!
//! Holds the threshold/count configuration of every event, the derived
//! statistics, the period and diagnostic-capture toggles, and the list of
//! active (thresholded) events. Fields are atomics so the hot path can read
//! them without taking the control lock; all mutations happen under that
//! lock, held by [`crate::sli::Sli`].

use crate::active::ActiveEventList;
use crate::error::{ControlError, SliError};
use crate::event::{EventId, LongTermEvent, MemLatEvent, SchedLatEvent};
use crate::faults::FaultInjector;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Atomic `Option<u64>`
///
/// `None` is encoded as `u64::MAX`, so storing `Some(u64::MAX)` reads back
/// as `None`. A limit of `u64::MAX` could never be reached anyway.
#[derive(Debug)]
pub struct AtomicLimit(AtomicU64);

impl AtomicLimit {
    const UNSET: u64 = u64::MAX;

    pub const fn unset() -> Self {
        Self(AtomicU64::new(Self::UNSET))
    }

    #[inline]
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            Self::UNSET => None,
            v => Some(v),
        }
    }

    /// Store a new limit, returning the previous one
    pub fn set(&self, limit: Option<u64>) -> Option<u64> {
        match self.0.swap(limit.unwrap_or(Self::UNSET), Ordering::AcqRel) {
            Self::UNSET => None,
            v => Some(v),
        }
    }

    /// Whether `value` reaches a configured limit
    #[inline]
    pub fn is_reached_by(&self, value: u64) -> bool {
        self.get().is_some_and(|limit| value >= limit)
    }
}

impl Default for AtomicLimit {
    fn default() -> Self {
        Self::unset()
    }
}

#[derive(Debug, Default)]
struct EventSlot {
    threshold: AtomicLimit,
    count: AtomicLimit,
    statistic: AtomicU64,
}

impl EventSlot {
    fn reset(&self) {
        self.threshold.set(None);
        self.count.set(None);
        self.statistic.store(0, Ordering::Relaxed);
    }
}

/// What a threshold write did to the active-events list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdTransition {
    /// unset -> set: entry published
    Activated,
    /// set -> unset: entry unlinked
    Deactivated,
    /// no set/unset change: updated in place
    Updated,
}

#[derive(Debug)]
pub struct EventMonitor {
    sched: [EventSlot; SchedLatEvent::COUNT],
    mem: [EventSlot; MemLatEvent::COUNT],
    longterm: [EventSlot; LongTermEvent::COUNT],
    /// Monitoring period in ticks, 0 = disabled
    period: AtomicU64,
    mbuf_enable: AtomicBool,
    /// Clock timestamp of creation or of the last long-term evaluation
    last_update: AtomicU64,
    active: ActiveEventList,
}

impl EventMonitor {
    /// Monitor with every threshold and count unset
    pub fn new(now_ns: u64) -> Self {
        Self {
            sched: std::array::from_fn(|_| EventSlot::default()),
            mem: std::array::from_fn(|_| EventSlot::default()),
            longterm: std::array::from_fn(|_| EventSlot::default()),
            period: AtomicU64::new(0),
            mbuf_enable: AtomicBool::new(false),
            last_update: AtomicU64::new(now_ns),
            active: ActiveEventList::new(),
        }
    }

    fn slot(&self, event: EventId) -> &EventSlot {
        match event {
            EventId::Sched(e) => &self.sched[e.index()],
            EventId::Mem(e) => &self.mem[e.index()],
            EventId::LongTerm(e) => &self.longterm[e.index()],
        }
    }

    pub fn threshold(&self, event: EventId) -> Option<u64> {
        self.slot(event).threshold.get()
    }

    pub fn count(&self, event: EventId) -> Option<u64> {
        self.slot(event).count.get()
    }

    #[inline]
    pub fn threshold_reached(&self, event: EventId, coarse: u64) -> bool {
        self.slot(event).threshold.is_reached_by(coarse)
    }

    pub fn statistic(&self, event: EventId) -> u64 {
        self.slot(event).statistic.load(Ordering::Relaxed)
    }

    /// Count one threshold crossing, returning the new total
    pub fn bump_statistic(&self, event: EventId) -> u64 {
        self.slot(event).statistic.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn swap_statistic(&self, event: EventId, value: u64) -> u64 {
        self.slot(event).statistic.swap(value, Ordering::Relaxed)
    }

    pub fn period_ticks(&self) -> u64 {
        self.period.load(Ordering::Acquire)
    }

    pub fn mbuf_enabled(&self) -> bool {
        self.mbuf_enable.load(Ordering::Acquire)
    }

    pub fn last_update_ns(&self) -> u64 {
        self.last_update.load(Ordering::Acquire)
    }

    pub fn set_last_update(&self, now_ns: u64) {
        self.last_update.store(now_ns, Ordering::Release);
    }

    pub fn active_events(&self) -> &ActiveEventList {
        &self.active
    }

    /// Store a new period; returns true if it flipped between zero and nonzero
    pub fn set_period(&self, ticks: u64) -> bool {
        let previous = self.period.swap(ticks, Ordering::AcqRel);
        (previous != 0) != (ticks != 0)
    }

    /// Store the capture toggle; returns true if it changed
    pub fn set_mbuf_enable(&self, on: bool) -> bool {
        self.mbuf_enable.swap(on, Ordering::AcqRel) != on
    }

    /// Apply a threshold/count write
    ///
    /// `statistic` is the new value of the event's running statistic. If
    /// publishing a new active entry fails, the previous threshold and count
    /// are restored and nothing changes.
    pub fn apply_threshold(
        &self,
        event: EventId,
        threshold: Option<u64>,
        count: Option<u64>,
        statistic: u64,
        faults: &FaultInjector,
    ) -> Result<ThresholdTransition, ControlError> {
        let slot = self.slot(event);
        let last_threshold = slot.threshold.set(threshold);
        let last_count = slot.count.set(count);
        let last_statistic = slot.statistic.swap(statistic, Ordering::Relaxed);

        match (last_threshold, threshold) {
            (None, Some(_)) => {
                if self.active.insert(event, faults).is_err() {
                    slot.threshold.set(last_threshold);
                    slot.count.set(last_count);
                    slot.statistic.store(last_statistic, Ordering::Relaxed);
                    return Err(ControlError::OutOfMemory);
                }
                Ok(ThresholdTransition::Activated)
            }
            (Some(_), None) => {
                self.active.remove(event);
                Ok(ThresholdTransition::Deactivated)
            }
            _ => Ok(ThresholdTransition::Updated),
        }
    }

    /// Copy the active configuration of `source` into this (fresh) monitor
    ///
    /// `seed_longterm` supplies the starting statistic of long-term events.
    /// On failure every copied entry is discarded.
    pub fn inherit_from(
        &self,
        source: &EventMonitor,
        seed_longterm: impl Fn(LongTermEvent) -> u64,
        faults: &FaultInjector,
    ) -> Result<usize, SliError> {
        let mut copied = 0usize;
        let result = source.active.try_for_each(|event| {
            // Raced with a write that just disabled the event.
            let Some(threshold) = source.threshold(event) else {
                return Ok(());
            };
            let slot = self.slot(event);
            slot.threshold.set(Some(threshold));
            slot.count.set(source.count(event));
            if let EventId::LongTerm(e) = event {
                slot.statistic.store(seed_longterm(e), Ordering::Relaxed);
            }
            if let Err(err) = self.active.insert(event, faults) {
                slot.reset();
                return Err(err);
            }
            copied += 1;
            Ok(())
        });

        if let Err(err) = result {
            self.active.for_each(|event| self.slot(event).reset());
            self.active.clear();
            return Err(SliError::Inheritance(err.to_string()));
        }

        self.period.store(source.period_ticks(), Ordering::Release);
        self.mbuf_enable.store(source.mbuf_enabled(), Ordering::Release);
        Ok(copied)
    }
}
