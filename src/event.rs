//! Event families and their fixed, ordered event ids
//!
//! The enumeration order is part of the control surface: `show` lists
//! events in this order and the parser resolves names against it.

use std::fmt;

/// Define a family of latency events with stable indices and names
macro_rules! latency_events {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every event of the family in enumeration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Number of events in the family
            pub const COUNT: usize = Self::ALL.len();

            #[inline]
            pub fn index(self) -> usize {
                self as usize
            }

            pub fn from_index(index: usize) -> Option<Self> {
                Self::ALL.get(index).copied()
            }

            /// Name shown on status surfaces and used as diagnostic reason
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

latency_events! {
    /// Scheduling latency events
    SchedLatEvent {
        Wait => "schedlat_wait",
        Block => "schedlat_block",
        IoBlock => "schedlat_ioblock",
        Sleep => "schedlat_sleep",
        LongSys => "schedlat_longsys",
        RunDelay => "schedlat_rundelay",
        IrqTime => "schedlat_irqtime",
    }
}

latency_events! {
    /// Memory-management stall events
    MemLatEvent {
        GlobalDirectReclaim => "memlat_global_direct_reclaim",
        MemcgDirectReclaim => "memlat_memcg_direct_reclaim",
        DirectCompact => "memlat_direct_compact",
        GlobalDirectSwapout => "memlat_global_direct_swapout",
        MemcgDirectSwapout => "memlat_memcg_direct_swapout",
        DirectSwapin => "memlat_direct_swapin",
        PageAlloc => "memlat_page_alloc",
    }
}

latency_events! {
    /// Long-term events, derived from scheduling counters over a period
    LongTermEvent {
        RunDelay => "longterm_rundelay",
        IrqTime => "longterm_irqtime",
    }
}

impl LongTermEvent {
    /// Scheduling event whose accumulated latency feeds this statistic
    pub fn source(self) -> SchedLatEvent {
        match self {
            LongTermEvent::RunDelay => SchedLatEvent::RunDelay,
            LongTermEvent::IrqTime => SchedLatEvent::IrqTime,
        }
    }
}

/// Event family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    SchedLat,
    MemLat,
    LongTerm,
}

impl EventFamily {
    pub const ALL: [EventFamily; 3] = [EventFamily::SchedLat, EventFamily::MemLat, EventFamily::LongTerm];

    /// Keyword prefix on the control surface
    pub fn prefix(self) -> &'static str {
        match self {
            EventFamily::SchedLat => "schedlat_",
            EventFamily::MemLat => "memlat_",
            EventFamily::LongTerm => "longterm_",
        }
    }

    pub fn event_count(self) -> usize {
        match self {
            EventFamily::SchedLat => SchedLatEvent::COUNT,
            EventFamily::MemLat => MemLatEvent::COUNT,
            EventFamily::LongTerm => LongTermEvent::COUNT,
        }
    }

    /// Resolve an event of this family by its index
    pub fn event(self, index: usize) -> Option<EventId> {
        match self {
            EventFamily::SchedLat => SchedLatEvent::from_index(index).map(EventId::Sched),
            EventFamily::MemLat => MemLatEvent::from_index(index).map(EventId::Mem),
            EventFamily::LongTerm => LongTermEvent::from_index(index).map(EventId::LongTerm),
        }
    }
}

impl fmt::Display for EventFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches('_'))
    }
}

/// A monitored event: family plus id within the family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    Sched(SchedLatEvent),
    Mem(MemLatEvent),
    LongTerm(LongTermEvent),
}

impl EventId {
    pub fn family(self) -> EventFamily {
        match self {
            EventId::Sched(_) => EventFamily::SchedLat,
            EventId::Mem(_) => EventFamily::MemLat,
            EventId::LongTerm(_) => EventFamily::LongTerm,
        }
    }

    /// Index within the family
    pub fn index(self) -> usize {
        match self {
            EventId::Sched(e) => e.index(),
            EventId::Mem(e) => e.index(),
            EventId::LongTerm(e) => e.index(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventId::Sched(e) => e.name(),
            EventId::Mem(e) => e.name(),
            EventId::LongTerm(e) => e.name(),
        }
    }

    /// Every event of every family, in status-surface order
    pub fn all() -> impl Iterator<Item = EventId> {
        EventFamily::ALL
            .into_iter()
            .flat_map(|family| (0..family.event_count()).filter_map(move |i| family.event(i)))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_sizes() {
        assert_eq!(SchedLatEvent::COUNT, 7);
        assert_eq!(MemLatEvent::COUNT, 7);
        assert_eq!(LongTermEvent::COUNT, 2);
        assert_eq!(EventId::all().count(), 16);
    }

    #[test]
    fn test_sched_order_matches_control_table() {
        let names: Vec<_> = SchedLatEvent::ALL.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            [
                "schedlat_wait",
                "schedlat_block",
                "schedlat_ioblock",
                "schedlat_sleep",
                "schedlat_longsys",
                "schedlat_rundelay",
                "schedlat_irqtime",
            ]
        );
    }

    #[test]
    fn test_longterm_source_events() {
        assert_eq!(LongTermEvent::RunDelay.source(), SchedLatEvent::RunDelay);
        assert_eq!(LongTermEvent::IrqTime.source(), SchedLatEvent::IrqTime);
        // Long-term ids are offsets from the run-delay scheduling index.
        for e in LongTermEvent::ALL {
            assert_eq!(e.source().index(), SchedLatEvent::RunDelay.index() + e.index());
        }
    }

    #[test]
    fn test_event_id_roundtrip_through_family() {
        for id in EventId::all() {
            assert_eq!(id.family().event(id.index()), Some(id));
        }
        assert_eq!(EventFamily::LongTerm.event(2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(EventFamily::MemLat.to_string(), "memlat");
        assert_eq!(EventId::Mem(MemLatEvent::PageAlloc).to_string(), "memlat_page_alloc");
    }
}
