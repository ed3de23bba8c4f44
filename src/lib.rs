//! Latscope - per-resource-group latency observability
//!
//! This library measures scheduling and memory-stall latencies per
//! execution unit, aggregates them per resource group into latency
//! histograms, and optionally captures a call stack when a configured
//! threshold is crossed. Configuration is changed live through a text
//! control protocol and inherited by child groups at creation.

pub mod active;
pub mod bucket;
pub mod capture;
pub mod clock;
pub mod config;
pub mod control;
pub mod counters;
pub mod error;
pub mod event;
pub mod faults; // allocation-failure injection for degrade paths
pub mod gate;
pub mod group;
pub mod longsys;
pub mod monitor;
pub mod sli;
pub mod status;
pub mod telemetry;
pub mod unit;

pub use config::SliConfig;
pub use error::{ControlError, SliError};
pub use group::{GroupSli, ResourceGroup};
pub use sli::{LongTermAlert, RecordOutcome, Sli};
