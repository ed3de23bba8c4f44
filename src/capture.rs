//! Diagnostic capture (mbuf)
//!
//! When a record crosses its group's threshold and capture is enabled, the
//! subject's call stack is sampled and written to the group's bounded log
//! as one header line followed by one `[<0>] <symbol>` line per frame.
//!
//! Capture is advisory: a frame buffer that cannot be allocated drops the
//! record, and a thread already inside a capture is refused.

use crate::faults::FaultInjector;
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Maximum frames captured per record
pub const MAX_STACK_TRACE_DEPTH: usize = 64;

/// Task name length limit, terminator included
const TASK_COMM_LEN: usize = 16;

/// Identity of the task a record is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskInfo {
    pub comm: String,
    pub pid: u32,
}

impl TaskInfo {
    /// `comm` is cut to at most 15 bytes, on a char boundary
    pub fn new(comm: impl Into<String>, pid: u32) -> Self {
        let mut comm = comm.into();
        if comm.len() >= TASK_COMM_LEN {
            let mut cut = TASK_COMM_LEN - 1;
            while !comm.is_char_boundary(cut) {
                cut -= 1;
            }
            comm.truncate(cut);
        }
        Self { comm, pid }
    }

    /// The calling thread, named after the thread (or the process if unnamed)
    pub fn current() -> Self {
        let thread = std::thread::current();
        let comm = thread.name().unwrap_or("unnamed").to_string();
        Self::new(comm, std::process::id())
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.comm, self.pid)
    }
}

/// Source of call stacks
///
/// Implementations must not block; they run on the recording path.
pub trait StackSampler: Send + Sync {
    /// Append up to `max_depth` return addresses of `task` to `frames`
    fn sample(&self, task: &TaskInfo, frames: &mut Vec<usize>, max_depth: usize);

    /// Render one address as `symbol+0xoffset`
    fn symbolize(&self, addr: usize) -> String;
}

/// Samples the calling thread with the `backtrace` crate
///
/// A thread cannot be unwound from outside, so the `task` argument only
/// labels the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceSampler;

impl StackSampler for BacktraceSampler {
    fn sample(&self, _task: &TaskInfo, frames: &mut Vec<usize>, max_depth: usize) {
        backtrace::trace(|frame| {
            if frames.len() >= max_depth {
                return false;
            }
            frames.push(frame.ip() as usize);
            true
        });
    }

    fn symbolize(&self, addr: usize) -> String {
        let mut rendered = None;
        backtrace::resolve(addr as *mut std::ffi::c_void, |symbol| {
            if rendered.is_some() {
                return;
            }
            if let Some(name) = symbol.name() {
                let offset = symbol
                    .addr()
                    .map(|start| addr.saturating_sub(start as usize))
                    .unwrap_or(0);
                rendered = Some(format!("{:#}+{:#x}", name, offset));
            }
        });
        rendered.unwrap_or_else(|| format!("{:#x}", addr))
    }
}

#[derive(Debug, Default)]
struct LogInner {
    lines: VecDeque<String>,
    bytes: usize,
    records: u64,
    evicted: u64,
}

/// Bounded per-group text log
///
/// Holds at most `capacity` bytes of lines (newlines included); the
/// oldest lines are evicted first. The newest line is always kept.
#[derive(Debug)]
pub struct DiagnosticLog {
    capacity: usize,
    inner: Mutex<LogInner>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LogInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a header and its frame lines as one record
    pub fn append_record<I>(&self, header: String, frames: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut inner = self.lock();
        inner.records += 1;
        for line in std::iter::once(header).chain(frames) {
            inner.bytes += line.len() + 1;
            inner.lines.push_back(line);
            while inner.bytes > self.capacity && inner.lines.len() > 1 {
                if let Some(old) = inner.lines.pop_front() {
                    inner.bytes -= old.len() + 1;
                    inner.evicted += 1;
                }
            }
        }
    }

    /// Log text, one line per `\n`
    pub fn contents(&self) -> String {
        let inner = self.lock();
        let mut out = String::with_capacity(inner.bytes);
        for line in &inner.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    pub fn len_bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Records appended since creation or the last clear
    pub fn records(&self) -> u64 {
        self.lock().records
    }

    pub fn evicted_lines(&self) -> u64 {
        self.lock().evicted
    }

    pub fn clear(&self) {
        *self.lock() = LogInner::default();
    }
}

/// Who a capture is about
#[derive(Debug, Clone, Copy)]
pub enum CaptureSubject<'a> {
    /// A task stalled on `reason`; its own stack is sampled
    Task { reason: &'a str, task: &'a TaskInfo },
    /// Run delay of `next`; the stack of `prev`, which held the unit, is sampled
    Handoff {
        next: &'a TaskInfo,
        prev: &'a TaskInfo,
    },
}

impl CaptureSubject<'_> {
    fn sampled(&self) -> &TaskInfo {
        match self {
            CaptureSubject::Task { task, .. } => task,
            CaptureSubject::Handoff { prev, .. } => prev,
        }
    }

    fn header(&self, duration: u64) -> String {
        match self {
            CaptureSubject::Task { reason, task } => format!(
                "record reason:{} comm:{} pid:{} duration={}",
                reason, task.comm, task.pid, duration
            ),
            CaptureSubject::Handoff { next, prev } => format!(
                "record reason:schedlat_rundelay next_comm:{} next_pid:{} prev_comm:{} prev_pid:{} duration={}",
                next.comm, next.pid, prev.comm, prev.pid, duration
            ),
        }
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        CAPTURING.with(|flag| (!flag.replace(true)).then_some(ReentryGuard))
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        CAPTURING.with(|flag| flag.set(false));
    }
}

/// Sample `subject` and append a record to `log`
///
/// Returns false if the record was dropped.
pub(crate) fn capture(
    log: &DiagnosticLog,
    subject: CaptureSubject<'_>,
    duration: u64,
    sampler: &dyn StackSampler,
    max_depth: usize,
    faults: &FaultInjector,
) -> bool {
    let Some(_guard) = ReentryGuard::enter() else {
        trace!(task = %subject.sampled(), "nested capture refused");
        return false;
    };

    let max_depth = max_depth.min(MAX_STACK_TRACE_DEPTH);
    let mut frames = match faults.try_vec::<usize>(max_depth, "capture frames") {
        Ok(frames) => frames,
        Err(err) => {
            trace!(error = %err, "capture dropped");
            return false;
        }
    };
    sampler.sample(subject.sampled(), &mut frames, max_depth);
    frames.truncate(max_depth);

    log.append_record(
        subject.header(duration),
        frames
            .iter()
            .map(|&addr| format!("[<0>] {}", sampler.symbolize(addr))),
    );
    true
}

/// Append a long-term threshold record (no stack)
pub(crate) fn record_longterm(log: &DiagnosticLog, name: &str, delta: u64, threshold: u64) {
    log.append_record(
        format!("record reason:{} delta={} threshold={}", name, delta, threshold),
        std::iter::empty(),
    );
}
