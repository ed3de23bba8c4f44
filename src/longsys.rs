//! Long-sys detection
//!
//! A task that keeps running in kernel mode while a reschedule is pending
//! shows up as `schedlat_longsys`. The detector keeps a baseline per task
//! (start timestamp, context-switch count, user time) and reports the time
//! elapsed since the baseline once both counters have stayed unchanged
//! between observations.

/// Scheduler-side view of a task at a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskSample {
    /// Task belongs to the fair scheduling class
    pub fair_class: bool,
    /// A reschedule has been requested
    pub need_resched: bool,
    /// Kernel threads belong to no group
    pub kernel_thread: bool,
    /// Voluntary plus involuntary context switches
    pub switches: u64,
    /// Accumulated user time
    pub utime: u64,
}

impl TaskSample {
    /// A fair-class user task with a pending reschedule
    pub fn pending(switches: u64, utime: u64) -> Self {
        Self {
            fair_class: true,
            need_resched: true,
            kernel_thread: false,
            switches,
            utime,
        }
    }

    fn is_candidate(&self) -> bool {
        self.fair_class && self.need_resched && !self.kernel_thread
    }
}

/// Per-task baseline, owned alongside the task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LongSysTracker {
    kernel_exec_start: u64,
    task_switch: u64,
    utime: u64,
}

impl LongSysTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `sample` at `now_ns`
    ///
    /// Returns the time spent in kernel mode since the baseline, or `None`
    /// when the task is not a candidate or the baseline was (re)started.
    pub fn observe(&mut self, sample: &TaskSample, now_ns: u64) -> Option<u64> {
        if !sample.is_candidate() {
            return None;
        }

        if self.kernel_exec_start == 0
            || self.task_switch != sample.switches
            || self.utime != sample.utime
        {
            self.kernel_exec_start = now_ns;
            self.task_switch = sample.switches;
            self.utime = sample.utime;
            return None;
        }

        Some(now_ns.saturating_sub(self.kernel_exec_start))
    }

    pub fn baseline_ns(&self) -> Option<u64> {
        (self.kernel_exec_start != 0).then_some(self.kernel_exec_start)
    }
}
