//! Subsystem facade
//!
//! [`Sli`] owns the gate, the default monitor used by the root group, and
//! the collaborators (clock, stack sampler, fault injector). It exposes
//! the hot-path entry points, group lifecycle hooks and the text control
//! and status surfaces.

use crate::capture::{self, BacktraceSampler, CaptureSubject, StackSampler, TaskInfo};
use crate::clock::{Clock, MonotonicClock};
use crate::config::SliConfig;
use crate::control::{parse_directive, ControlDirective};
use crate::counters::CounterSnapshot;
use crate::error::{ControlError, SliError};
use crate::event::{EventFamily, EventId, LongTermEvent, MemLatEvent, SchedLatEvent};
use crate::faults::FaultInjector;
use crate::gate::FastPathGate;
use crate::group::{GroupId, GroupSli, ResourceGroup};
use crate::longsys::{LongSysTracker, TaskSample};
use crate::monitor::EventMonitor;
use crate::status::{self, DISABLED_MESSAGE};
use crate::unit;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// What happened to one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Primary switch off; nothing recorded
    Disabled,
    /// Root group, or a group without latency state
    Unmonitored,
    /// No measurement was produced
    Skipped,
    /// Counted; no threshold crossed (or monitoring off)
    Recorded,
    /// Threshold crossed without a diagnostic record
    ThresholdCrossed,
    /// Threshold crossed and a diagnostic record written
    Captured,
}

/// A long-term event whose growth over a period reached its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermAlert {
    pub event: LongTermEvent,
    pub delta: u64,
    pub threshold: u64,
}

/// The latency subsystem
///
/// # Example
/// ```
/// use latscope::{Sli, SliConfig};
/// use latscope::capture::TaskInfo;
/// use latscope::event::SchedLatEvent;
///
/// let sli = Sli::new(SliConfig { enabled: true, ..SliConfig::default() }).unwrap();
/// let group = sli.create_group(sli.root(), "web");
/// sli.record_schedlat(&group, SchedLatEvent::Wait, &TaskInfo::new("nginx", 42), 3 << 20);
/// assert!(sli.schedlat_stat_show(&group).contains("1-4ms: 1"));
/// ```
pub struct Sli {
    config: SliConfig,
    gate: FastPathGate,
    default_monitor: EventMonitor,
    root: Arc<ResourceGroup>,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn StackSampler>,
    faults: FaultInjector,
    control_lock: Mutex<()>,
    next_group_id: AtomicU64,
}

impl Sli {
    pub fn new(config: SliConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid latency config: {}", e))?;
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        info!(
            units = config.units,
            tick_hz = config.tick_hz,
            enabled = config.enabled,
            "latency subsystem initialized"
        );
        Ok(Self {
            gate: FastPathGate::new(config.enabled),
            default_monitor: EventMonitor::new(clock.now_ns()),
            root: Arc::new(ResourceGroup::root()),
            clock,
            sampler: Arc::new(BacktraceSampler),
            faults: FaultInjector::new(),
            control_lock: Mutex::new(()),
            next_group_id: AtomicU64::new(1),
            config,
        })
    }

    /// Replace the clock; the default monitor is restamped
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.default_monitor.set_last_update(clock.now_ns());
        self.clock = clock;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn StackSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &SliConfig {
        &self.config
    }

    pub fn gate(&self) -> &FastPathGate {
        &self.gate
    }

    pub fn root(&self) -> &Arc<ResourceGroup> {
        &self.root
    }

    /// Monitor targeted by control writes to the root group
    pub fn default_monitor(&self) -> &EventMonitor {
        &self.default_monitor
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn lock_control(&self) -> MutexGuard<'_, ()> {
        self.control_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- group lifecycle ------------------------------------------------

    /// Create a child of `parent`
    ///
    /// Never fails: if latency state cannot be set up the group is created
    /// unmonitored.
    pub fn create_group(&self, parent: &Arc<ResourceGroup>, name: &str) -> Arc<ResourceGroup> {
        let id: GroupId = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        let group = Arc::new(ResourceGroup::child(id, name, Arc::clone(parent)));

        match self.alloc_group_sli(parent) {
            Ok((sli, inherited)) => {
                group.install(sli);
                debug!(group = %group.path(), inherited, "latency monitoring attached");
            }
            Err(err) => {
                warn!(group = %group.path(), error = %err, "latency monitoring unavailable");
            }
        }
        group
    }

    fn alloc_group_sli(&self, parent: &ResourceGroup) -> Result<(GroupSli, usize), SliError> {
        let sli = GroupSli::try_new(&self.config, self.clock.now_ns(), &self.faults)?;
        let seed = |event: LongTermEvent| sli.longterm_statistic(event);

        let inherited = parent.with_sli(|source| {
            sli.monitor().inherit_from(source.monitor(), seed, &self.faults)
        });
        let copied = match inherited {
            Some(result) => result?,
            None => sli
                .monitor()
                .inherit_from(&self.default_monitor, seed, &self.faults)?,
        };
        Ok((sli, copied))
    }

    /// Release the latency state of `group`; repeated calls are no-ops
    pub fn destroy_group(&self, group: &ResourceGroup) -> bool {
        let released = group.release();
        if released {
            debug!(group = %group.path(), "latency monitoring released");
        }
        released
    }

    // ---- hot path -------------------------------------------------------

    /// Record a scheduling latency of `task`
    #[inline]
    pub fn record_schedlat(
        &self,
        group: &ResourceGroup,
        event: SchedLatEvent,
        task: &TaskInfo,
        duration_ns: u64,
    ) -> RecordOutcome {
        let subject = CaptureSubject::Task {
            reason: event.name(),
            task,
        };
        self.record_sched_event(group, event, subject, duration_ns)
    }

    /// Record the run delay of `next`, which waited while `prev` ran
    pub fn record_rundelay(
        &self,
        group: &ResourceGroup,
        next: &TaskInfo,
        prev: &TaskInfo,
        duration_ns: u64,
    ) -> RecordOutcome {
        let subject = CaptureSubject::Handoff { next, prev };
        self.record_sched_event(group, SchedLatEvent::RunDelay, subject, duration_ns)
    }

    fn record_sched_event(
        &self,
        group: &ResourceGroup,
        event: SchedLatEvent,
        subject: CaptureSubject<'_>,
        duration_ns: u64,
    ) -> RecordOutcome {
        if !self.gate.is_enabled() {
            return RecordOutcome::Disabled;
        }
        if group.is_root() {
            return RecordOutcome::Unmonitored;
        }
        group
            .with_sli(|sli| {
                let coarse = sli.sched().record(unit::current(), event.index(), duration_ns);
                self.check_threshold(sli, EventId::Sched(event), coarse, subject)
            })
            .unwrap_or(RecordOutcome::Unmonitored)
    }

    /// Start timing a memory stall; `None` while the subsystem is disabled
    #[inline]
    pub fn memlat_start(&self) -> Option<u64> {
        self.gate.is_enabled().then(|| self.clock.now_ns())
    }

    /// Finish a stall started with [`Sli::memlat_start`]
    pub fn memlat_end(
        &self,
        group: &ResourceGroup,
        event: MemLatEvent,
        task: &TaskInfo,
        start: Option<u64>,
    ) -> RecordOutcome {
        let Some(start) = start else {
            return RecordOutcome::Disabled;
        };
        let duration = self.clock.now_ns().saturating_sub(start);
        self.record_memlat(group, event, task, duration)
    }

    /// Record a memory stall of known duration
    pub fn record_memlat(
        &self,
        group: &ResourceGroup,
        event: MemLatEvent,
        task: &TaskInfo,
        duration_ns: u64,
    ) -> RecordOutcome {
        if !self.gate.is_enabled() {
            return RecordOutcome::Disabled;
        }
        if group.is_root() {
            return RecordOutcome::Unmonitored;
        }
        group
            .with_sli(|sli| {
                let coarse = sli.mem().record(unit::current(), event.index(), duration_ns);
                let subject = CaptureSubject::Task {
                    reason: event.name(),
                    task,
                };
                self.check_threshold(sli, EventId::Mem(event), coarse, subject)
            })
            .unwrap_or(RecordOutcome::Unmonitored)
    }

    /// Tick-time check for a task stuck in kernel mode
    pub fn check_longsys(
        &self,
        group: &ResourceGroup,
        task: &TaskInfo,
        sample: &TaskSample,
        tracker: &mut LongSysTracker,
    ) -> RecordOutcome {
        if !self.gate.is_enabled() {
            return RecordOutcome::Disabled;
        }
        match tracker.observe(sample, self.clock.now_ns()) {
            Some(delta) => self.record_schedlat(group, SchedLatEvent::LongSys, task, delta),
            None => RecordOutcome::Skipped,
        }
    }

    fn check_threshold(
        &self,
        sli: &GroupSli,
        event: EventId,
        coarse: u64,
        subject: CaptureSubject<'_>,
    ) -> RecordOutcome {
        if !self.gate.is_monitoring() {
            return RecordOutcome::Recorded;
        }
        let monitor = sli.monitor();
        if !monitor.threshold_reached(event, coarse) {
            return RecordOutcome::Recorded;
        }

        // crossings only count against `count` while captures are possible
        if !monitor.mbuf_enabled() {
            return RecordOutcome::ThresholdCrossed;
        }
        let crossings = monitor.bump_statistic(event);
        if monitor.count(event).is_some_and(|cap| crossings > cap) {
            return RecordOutcome::ThresholdCrossed;
        }

        let captured = capture::capture(
            sli.mbuf(),
            subject,
            coarse,
            self.sampler.as_ref(),
            self.config.max_stack_depth,
            &self.faults,
        );
        if captured {
            RecordOutcome::Captured
        } else {
            RecordOutcome::ThresholdCrossed
        }
    }

    // ---- control surface --------------------------------------------------

    /// Apply one control directive to `group`, returning the bytes consumed
    ///
    /// Writes to the root group configure the default monitor inherited by
    /// new groups.
    pub fn control_write(&self, group: &ResourceGroup, input: &str) -> Result<usize, ControlError> {
        let directive = parse_directive(input, self.config.tick_hz)?;
        let _lock = self.lock_control();

        if group.is_root() {
            self.apply_directive(&self.default_monitor, None, directive)?;
        } else {
            group
                .with_sli(|sli| self.apply_directive(sli.monitor(), Some(sli), directive))
                .ok_or(ControlError::Unavailable)??;
        }

        debug!(group = %group.path(), ?directive, "control directive applied");
        Ok(input.len())
    }

    /// `sli` is `None` for the default monitor
    fn apply_directive(
        &self,
        monitor: &EventMonitor,
        sli: Option<&GroupSli>,
        directive: ControlDirective,
    ) -> Result<(), ControlError> {
        let is_default = sli.is_none();
        match directive {
            ControlDirective::Threshold {
                event,
                threshold,
                count,
            } => {
                let statistic = match (event, sli) {
                    (EventId::LongTerm(e), Some(sli)) => sli.longterm_statistic(e),
                    _ => 0,
                };
                monitor.apply_threshold(event, threshold, count, statistic, &self.faults)?;
            }
            ControlDirective::Period { ticks } => {
                if monitor.set_period(ticks) && is_default && !monitor.mbuf_enabled() {
                    self.gate.set_monitoring(ticks != 0);
                }
            }
            ControlDirective::MbufEnable(on) => {
                if monitor.set_mbuf_enable(on) && is_default && monitor.period_ticks() == 0 {
                    self.gate.set_monitoring(on);
                }
            }
        }
        Ok(())
    }

    /// Current configuration of `group`'s monitor
    ///
    /// Empty for a group without latency state.
    pub fn control_show(&self, group: &ResourceGroup) -> String {
        if group.is_root() {
            return status::render_control(&self.default_monitor);
        }
        group
            .with_sli(|sli| status::render_control(sli.monitor()))
            .unwrap_or_default()
    }

    /// Primary switch: the first byte must be `0` or `1`
    pub fn enabled_write(&self, input: &[u8]) -> Result<usize, ControlError> {
        let on = match input.first() {
            None => return Err(ControlError::Empty),
            Some(b'0') => false,
            Some(b'1') => true,
            Some(_) => {
                return Err(ControlError::InvalidNumber(
                    String::from_utf8_lossy(input).into_owned(),
                ))
            }
        };
        if self.gate.set_enabled(on) != on {
            info!(enabled = on, "latency subsystem switched");
        }
        Ok(input.len())
    }

    pub fn enabled_show(&self) -> String {
        format!("{}\n", u8::from(self.gate.is_enabled()))
    }

    // ---- status surface -------------------------------------------------

    fn stat_show(&self, group: &ResourceGroup, render: impl FnOnce(&GroupSli) -> String) -> String {
        if !self.gate.is_enabled() {
            return DISABLED_MESSAGE.to_string();
        }
        group.with_sli(render).unwrap_or_default()
    }

    pub fn schedlat_stat_show(&self, group: &ResourceGroup) -> String {
        self.stat_show(group, |sli| {
            status::render_histogram(sli.sched(), EventFamily::SchedLat)
        })
    }

    pub fn memlat_stat_show(&self, group: &ResourceGroup) -> String {
        self.stat_show(group, |sli| status::render_histogram(sli.mem(), EventFamily::MemLat))
    }

    pub fn schedlat_max_show(&self, group: &ResourceGroup) -> String {
        self.stat_show(group, |sli| status::render_max(sli.sched(), EventFamily::SchedLat))
    }

    pub fn memlat_max_show(&self, group: &ResourceGroup) -> String {
        self.stat_show(group, |sli| status::render_max(sli.mem(), EventFamily::MemLat))
    }

    /// Aggregated counters of one family; `None` for long-term or unmonitored groups
    pub fn snapshot(&self, group: &ResourceGroup, family: EventFamily) -> Option<CounterSnapshot> {
        group
            .with_sli(|sli| match family {
                EventFamily::SchedLat => Some(sli.sched().snapshot()),
                EventFamily::MemLat => Some(sli.mem().snapshot()),
                EventFamily::LongTerm => None,
            })
            .flatten()
    }

    /// Diagnostic log of `group`
    pub fn mbuf_read(&self, group: &ResourceGroup) -> String {
        group.with_sli(|sli| sli.mbuf().contents()).unwrap_or_default()
    }

    // ---- long-term evaluation ---------------------------------------------

    /// Evaluate `group`'s long-term events if its period has elapsed
    ///
    /// Each active long-term event compares the growth of its source
    /// statistic since the previous evaluation against its threshold.
    pub fn poll_longterm(&self, group: &ResourceGroup) -> Vec<LongTermAlert> {
        if !self.gate.is_enabled() {
            return Vec::new();
        }
        group
            .with_sli(|sli| self.evaluate_longterm(sli))
            .unwrap_or_default()
    }

    fn evaluate_longterm(&self, sli: &GroupSli) -> Vec<LongTermAlert> {
        let monitor = sli.monitor();
        let period = monitor.period_ticks();
        if period == 0 {
            return Vec::new();
        }
        let now = self.clock.now_ns();
        if now.saturating_sub(monitor.last_update_ns()) < self.config.ticks_to_nanos(period) {
            return Vec::new();
        }
        monitor.set_last_update(now);

        let mut alerts = Vec::new();
        monitor.active_events().for_each(|id| {
            let EventId::LongTerm(event) = id else {
                return;
            };
            let current = sli.longterm_statistic(event);
            let previous = monitor.swap_statistic(id, current);
            let delta = current.saturating_sub(previous);
            let Some(threshold) = monitor.threshold(id) else {
                return;
            };
            if delta < threshold {
                return;
            }
            if monitor.mbuf_enabled() {
                capture::record_longterm(sli.mbuf(), event.name(), delta, threshold);
            }
            alerts.push(LongTermAlert {
                event,
                delta,
                threshold,
            });
        });
        alerts
    }
}

impl std::fmt::Debug for Sli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sli")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("default_monitor", &self.default_monitor)
            .finish_non_exhaustive()
    }
}
