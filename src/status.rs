//! Text rendering of the control and statistics files

use crate::bucket::LatencyBucket;
use crate::control::display_limit;
use crate::counters::LatencyCounters;
use crate::event::{EventFamily, EventId};
use crate::monitor::EventMonitor;
use std::fmt::Write;

/// Returned by the statistics files while the primary switch is off
pub const DISABLED_MESSAGE: &str = "sli is not enabled, please echo 1 > /proc/sli/sli_enabled\n";

/// `period`, `mbuf_enable`, then `<name>: threshold: <t>, count: <c>` per event
pub fn render_control(monitor: &EventMonitor) -> String {
    let mut out = String::with_capacity(2048);
    let _ = writeln!(out, "period: {}", monitor.period_ticks());
    let _ = writeln!(out, "mbuf_enable: {}", u8::from(monitor.mbuf_enabled()));
    for event in EventId::all() {
        let _ = writeln!(
            out,
            "{}: threshold: {}, count: {}",
            event.name(),
            display_limit(monitor.threshold(event)),
            display_limit(monitor.count(event)),
        );
    }
    out
}

/// One `<name>:` block per event followed by its 8 bucket lines
pub fn render_histogram(counters: &LatencyCounters, family: EventFamily) -> String {
    let snapshot = counters.snapshot();
    let mut out = String::new();
    for (index, stats) in snapshot.events.iter().enumerate() {
        let Some(event) = family.event(index) else {
            break;
        };
        let _ = writeln!(out, "{}:", event.name());
        for bucket in LatencyBucket::ALL {
            let _ = writeln!(out, "{}: {}", bucket.label(), stats.bucket(bucket));
        }
    }
    out
}

/// `<name>: <summed latency_max>` per event
pub fn render_max(counters: &LatencyCounters, family: EventFamily) -> String {
    let mut out = String::new();
    for index in 0..counters.events() {
        let Some(event) = family.event(index) else {
            break;
        };
        let _ = writeln!(out, "{}: {}", event.name(), counters.latency_sum(index));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LongTermEvent, SchedLatEvent};
    use crate::faults::FaultInjector;

    #[test]
    fn test_render_control_defaults() {
        let monitor = EventMonitor::new(1);
        let text = render_control(&monitor);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "period: 0");
        assert_eq!(lines[1], "mbuf_enable: 0");
        assert_eq!(lines[2], "schedlat_wait: threshold: 0, count: 0");
        assert_eq!(lines.len(), 2 + 7 + 7 + 2);
        assert_eq!(lines[lines.len() - 1], "longterm_irqtime: threshold: 0, count: 0");
    }

    #[test]
    fn test_render_control_values() {
        let monitor = EventMonitor::new(1);
        let faults = FaultInjector::new();
        monitor
            .apply_threshold(EventId::Sched(SchedLatEvent::Wait), Some(100), Some(5), 0, &faults)
            .unwrap();
        monitor
            .apply_threshold(EventId::LongTerm(LongTermEvent::RunDelay), Some(9), None, 0, &faults)
            .unwrap();
        monitor.set_period(25);
        monitor.set_mbuf_enable(true);

        let text = render_control(&monitor);
        assert!(text.starts_with("period: 25\nmbuf_enable: 1\n"));
        assert!(text.contains("schedlat_wait: threshold: 100, count: 5\n"));
        assert!(text.contains("longterm_rundelay: threshold: 9, count: 0\n"));
    }

    #[test]
    fn test_render_histogram_layout() {
        let counters = LatencyCounters::try_new(2, SchedLatEvent::COUNT, &FaultInjector::new()).unwrap();
        counters.record(0, SchedLatEvent::Sleep.index(), 5 << 20);
        counters.record(1, SchedLatEvent::Sleep.index(), 200 << 20);

        let text = render_histogram(&counters, EventFamily::SchedLat);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), SchedLatEvent::COUNT * 9);
        assert_eq!(lines[0], "schedlat_wait:");
        assert_eq!(lines[1], "0-1ms: 0");
        assert_eq!(lines[8], ">=128ms: 0");

        let sleep = SchedLatEvent::Sleep.index() * 9;
        assert_eq!(lines[sleep], "schedlat_sleep:");
        assert_eq!(lines[sleep + 3], "4-8ms: 1");
        assert_eq!(lines[sleep + 8], ">=128ms: 1");
    }

    #[test]
    fn test_render_max() {
        let counters = LatencyCounters::try_new(1, SchedLatEvent::COUNT, &FaultInjector::new()).unwrap();
        counters.record(0, SchedLatEvent::IrqTime.index(), 4096);
        counters.record(0, SchedLatEvent::IrqTime.index(), 2048);
        let text = render_max(&counters, EventFamily::SchedLat);
        assert!(text.starts_with("schedlat_wait: 0\n"));
        assert!(text.contains("schedlat_irqtime: 6\n"));
        assert_eq!(text.lines().count(), SchedLatEvent::COUNT);
    }
}
