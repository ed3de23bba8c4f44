//! Resource groups and their latency state
//!
//! A non-root group owns at most one [`GroupSli`]. The slot is an epoch
//! managed pointer: the recording path loads it under a guard and can keep
//! using it while the group is destroyed, since reclamation waits for
//! every guard pinned before the release.

use crate::capture::DiagnosticLog;
use crate::config::SliConfig;
use crate::counters::LatencyCounters;
use crate::error::SliError;
use crate::event::{LongTermEvent, MemLatEvent, SchedLatEvent};
use crate::faults::FaultInjector;
use crate::monitor::EventMonitor;
use crossbeam::epoch::{self, Atomic, Owned, Shared};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub type GroupId = u64;

/// Counters, monitor and diagnostic log of one group
#[derive(Debug)]
pub struct GroupSli {
    sched: LatencyCounters,
    mem: LatencyCounters,
    monitor: EventMonitor,
    mbuf: DiagnosticLog,
}

impl GroupSli {
    /// Allocate counters for both families and an all-unset monitor
    pub fn try_new(config: &SliConfig, now_ns: u64, faults: &FaultInjector) -> Result<Self, SliError> {
        let mem = LatencyCounters::try_new(config.units, MemLatEvent::COUNT, faults)?;
        let sched = LatencyCounters::try_new(config.units, SchedLatEvent::COUNT, faults)?;
        faults.check("event monitor")?;
        Ok(Self {
            sched,
            mem,
            monitor: EventMonitor::new(now_ns),
            mbuf: DiagnosticLog::new(config.mbuf_capacity),
        })
    }

    pub fn sched(&self) -> &LatencyCounters {
        &self.sched
    }

    pub fn mem(&self) -> &LatencyCounters {
        &self.mem
    }

    pub fn monitor(&self) -> &EventMonitor {
        &self.monitor
    }

    pub fn mbuf(&self) -> &DiagnosticLog {
        &self.mbuf
    }

    /// Accumulated latency feeding a long-term event
    pub fn longterm_statistic(&self, event: LongTermEvent) -> u64 {
        self.sched.latency_sum(event.source().index())
    }
}

/// Node of the resource-group tree
pub struct ResourceGroup {
    id: GroupId,
    name: String,
    parent: Option<Arc<ResourceGroup>>,
    sli: Atomic<GroupSli>,
}

impl ResourceGroup {
    pub(crate) fn root() -> Self {
        Self {
            id: 0,
            name: String::new(),
            parent: None,
            sli: Atomic::null(),
        }
    }

    pub(crate) fn child(id: GroupId, name: impl Into<String>, parent: Arc<ResourceGroup>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: Some(parent),
            sli: Atomic::null(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ResourceGroup>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Slash-separated path from the root
    pub fn path(&self) -> String {
        match &self.parent {
            None => "/".to_string(),
            Some(parent) if parent.is_root() => format!("/{}", self.name),
            Some(parent) => format!("{}/{}", parent.path(), self.name),
        }
    }

    /// Whether latency state is currently installed
    pub fn is_monitored(&self) -> bool {
        let guard = epoch::pin();
        !self.sli.load(Ordering::Acquire, &guard).is_null()
    }

    /// Run `f` against the installed state, if any
    #[inline]
    pub fn with_sli<R>(&self, f: impl FnOnce(&GroupSli) -> R) -> Option<R> {
        let guard = epoch::pin();
        let shared = self.sli.load(Ordering::Acquire, &guard);
        // SAFETY: the slot is only reclaimed through the epoch collector and
        // `guard` stays pinned while `f` runs.
        unsafe { shared.as_ref() }.map(f)
    }

    pub(crate) fn install(&self, sli: GroupSli) {
        let guard = epoch::pin();
        let previous = self.sli.swap(Owned::new(sli), Ordering::AcqRel, &guard);
        if !previous.is_null() {
            // SAFETY: `previous` is no longer reachable from the slot.
            unsafe { guard.defer_destroy(previous) };
        }
    }

    /// Detach the state; returns false if there was none
    pub(crate) fn release(&self) -> bool {
        let guard = epoch::pin();
        let previous = self.sli.swap(Shared::null(), Ordering::AcqRel, &guard);
        if previous.is_null() {
            return false;
        }
        // SAFETY: as in `install`.
        unsafe { guard.defer_destroy(previous) };
        true
    }
}

impl fmt::Debug for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGroup")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("monitored", &self.is_monitored())
            .finish()
    }
}

impl Drop for ResourceGroup {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no guard can reach the slot any more.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.sli.swap(Shared::null(), Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SliConfig {
        SliConfig {
            units: 2,
            ..SliConfig::default()
        }
    }

    #[test]
    fn test_group_sli_allocation() {
        let sli = GroupSli::try_new(&config(), 5, &FaultInjector::new()).unwrap();
        assert_eq!(sli.sched().events(), SchedLatEvent::COUNT);
        assert_eq!(sli.mem().events(), MemLatEvent::COUNT);
        assert_eq!(sli.monitor().last_update_ns(), 5);
        assert!(sli.mbuf().contents().is_empty());
    }

    #[test]
    fn test_group_sli_allocation_failure() {
        for nth in 1..=4 {
            let faults = FaultInjector::new();
            faults.fail_nth(nth);
            assert!(GroupSli::try_new(&config(), 5, &faults).is_err(), "fault {}", nth);
        }
    }

    #[test]
    fn test_longterm_statistic_follows_source() {
        let sli = GroupSli::try_new(&config(), 1, &FaultInjector::new()).unwrap();
        sli.sched().record(0, SchedLatEvent::RunDelay.index(), 10 << 10);
        sli.sched().record(1, SchedLatEvent::RunDelay.index(), 5 << 10);
        sli.sched().record(1, SchedLatEvent::IrqTime.index(), 1 << 10);
        assert_eq!(sli.longterm_statistic(LongTermEvent::RunDelay), 15);
        assert_eq!(sli.longterm_statistic(LongTermEvent::IrqTime), 1);
    }

    #[test]
    fn test_paths() {
        let root = Arc::new(ResourceGroup::root());
        let a = Arc::new(ResourceGroup::child(1, "a", Arc::clone(&root)));
        let b = ResourceGroup::child(2, "b", Arc::clone(&a));
        assert_eq!(root.path(), "/");
        assert_eq!(a.path(), "/a");
        assert_eq!(b.path(), "/a/b");
        assert!(root.is_root());
        assert!(!b.is_root());
    }

    #[test]
    fn test_install_and_release() {
        let root = Arc::new(ResourceGroup::root());
        let group = ResourceGroup::child(1, "g", root);
        assert!(!group.is_monitored());
        assert_eq!(group.with_sli(|_| ()), None);

        group.install(GroupSli::try_new(&config(), 1, &FaultInjector::new()).unwrap());
        assert!(group.is_monitored());
        assert_eq!(group.with_sli(|sli| sli.sched().units()), Some(2));

        assert!(group.release());
        assert!(!group.release());
        assert!(!group.is_monitored());
    }
}
