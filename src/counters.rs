//! Per-group latency counters, sharded per execution unit
//!
//! Each unit writes its own cache-padded shard, so concurrent updates from
//! different units never touch the same line. Reads sum every shard with
//! relaxed loads and no synchronization with writers: a snapshot taken
//! while records are in flight may miss (or, when a unit id wraps onto a
//! shard, double-count) at most one in-flight update per unit. This is
//! diagnostic data, so the skew is accepted rather than corrected.
//!
//! `latency_max` accumulates the coarsened duration (`duration >> 10`) of
//! every record, so it only ever grows.

use crate::bucket::{coarsen, LatencyBucket, BUCKET_COUNT};
use crate::error::SliError;
use crate::faults::FaultInjector;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by one execution unit
#[derive(Debug)]
struct CounterShard {
    histogram: Box<[[AtomicU64; BUCKET_COUNT]]>,
    latency_max: Box<[AtomicU64]>,
}

impl CounterShard {
    fn try_new(events: usize, faults: &FaultInjector) -> Result<Self, SliError> {
        let mut histogram: Vec<[AtomicU64; BUCKET_COUNT]> =
            faults.try_vec(events, "counter histogram")?;
        histogram.extend((0..events).map(|_| std::array::from_fn(|_| AtomicU64::new(0))));

        let mut latency_max: Vec<AtomicU64> = faults.try_vec(events, "counter latency_max")?;
        latency_max.extend((0..events).map(|_| AtomicU64::new(0)));

        Ok(Self {
            histogram: histogram.into_boxed_slice(),
            latency_max: latency_max.into_boxed_slice(),
        })
    }
}

/// Aggregated counters of a single event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSnapshot {
    pub buckets: [u64; BUCKET_COUNT],
    pub latency_max: u64,
}

impl EventSnapshot {
    pub fn bucket(&self, bucket: LatencyBucket) -> u64 {
        self.buckets[bucket.index()]
    }

    /// Number of recorded measurements
    pub fn total(&self) -> u64 {
        self.buckets.iter().fold(0u64, |acc, &n| acc.wrapping_add(n))
    }
}

/// Aggregated counters of a whole family, indexed by event index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub events: Vec<EventSnapshot>,
}

impl CounterSnapshot {
    pub fn event(&self, index: usize) -> Option<&EventSnapshot> {
        self.events.get(index)
    }
}

/// One family's counters for one group
#[derive(Debug)]
pub struct LatencyCounters {
    events: usize,
    shards: Box<[CachePadded<CounterShard>]>,
}

impl LatencyCounters {
    /// Allocate `units` shards of `events` rows each
    pub fn try_new(units: usize, events: usize, faults: &FaultInjector) -> Result<Self, SliError> {
        let units = units.max(1);
        let mut shards = faults.try_vec(units, "counter shards")?;
        for _ in 0..units {
            shards.push(CachePadded::new(CounterShard::try_new(events, faults)?));
        }
        Ok(Self {
            events,
            shards: shards.into_boxed_slice(),
        })
    }

    pub fn units(&self) -> usize {
        self.shards.len()
    }

    pub fn events(&self) -> usize {
        self.events
    }

    /// Record one measurement on `unit`'s shard
    ///
    /// Returns the coarsened duration used for threshold comparison.
    #[inline]
    pub fn record(&self, unit: usize, event: usize, duration_ns: u64) -> u64 {
        let bucket = LatencyBucket::classify(duration_ns);
        let coarse = coarsen(duration_ns);
        let shard = &self.shards[unit % self.shards.len()];

        shard.histogram[event][bucket.index()].fetch_add(1, Ordering::Relaxed);
        shard.latency_max[event].fetch_add(coarse, Ordering::Relaxed);
        coarse
    }

    /// Sum of one histogram cell across all units
    pub fn bucket_sum(&self, event: usize, bucket: LatencyBucket) -> u64 {
        self.shards.iter().fold(0u64, |acc, shard| {
            acc.wrapping_add(shard.histogram[event][bucket.index()].load(Ordering::Relaxed))
        })
    }

    /// Sum of accumulated coarse latency across all units
    pub fn latency_sum(&self, event: usize) -> u64 {
        self.shards.iter().fold(0u64, |acc, shard| {
            acc.wrapping_add(shard.latency_max[event].load(Ordering::Relaxed))
        })
    }

    /// Aggregate every event of the family
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut events = vec![EventSnapshot::default(); self.events];
        for shard in self.shards.iter() {
            for (event, snap) in events.iter_mut().enumerate() {
                for (cell, sum) in shard.histogram[event].iter().zip(snap.buckets.iter_mut()) {
                    *sum = sum.wrapping_add(cell.load(Ordering::Relaxed));
                }
                snap.latency_max = snap
                    .latency_max
                    .wrapping_add(shard.latency_max[event].load(Ordering::Relaxed));
            }
        }
        CounterSnapshot { events }
    }
}
