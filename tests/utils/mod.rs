// Integration test utilities
//
// Deterministic clock and stack sampler so captured records and long-term
// periods can be asserted exactly.

#![allow(dead_code)]

use latscope::capture::{StackSampler, TaskInfo};
use latscope::clock::ManualClock;
use latscope::{Sli, SliConfig};
use std::sync::Arc;

/// Sampler yielding `depth` synthetic frames named `frame_<n>`
pub struct FixedSampler {
    pub depth: usize,
}

impl StackSampler for FixedSampler {
    fn sample(&self, _task: &TaskInfo, frames: &mut Vec<usize>, max_depth: usize) {
        frames.extend(0..self.depth.min(max_depth));
    }

    fn symbolize(&self, addr: usize) -> String {
        format!("frame_{}+0x0", addr)
    }
}

pub fn test_config() -> SliConfig {
    SliConfig {
        units: 4,
        tick_hz: 1000,
        enabled: true,
        ..SliConfig::default()
    }
}

/// Enabled subsystem with a manual clock at 1ms and a 2-frame sampler
pub fn enabled_sli() -> (Sli, Arc<ManualClock>) {
    sli_with(test_config(), 2)
}

pub fn sli_with(config: SliConfig, depth: usize) -> (Sli, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let sli = Sli::new(config)
        .expect("valid test config")
        .with_clock(clock.clone())
        .with_sampler(Arc::new(FixedSampler { depth }));
    (sli, clock)
}

pub fn task(comm: &str, pid: u32) -> TaskInfo {
    TaskInfo::new(comm, pid)
}

/// Value of `<name>: threshold: <t>, count: <c>` in a control dump
pub fn threshold_line<'a>(show: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}: ", name);
    show.lines().find_map(|line| line.strip_prefix(prefix.as_str()))
}
