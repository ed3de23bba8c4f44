// Configuration for the latency subsystem
//
// Loaded from TOML; every field has a default so an empty file (or no file)
// yields a working setup.

use crate::capture::MAX_STACK_TRACE_DEPTH;
use crate::unit::default_unit_count;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Subsystem configuration
///
/// # Example
/// ```
/// use latscope::config::SliConfig;
///
/// let config = SliConfig::from_toml_str("tick_hz = 1000\nenabled = true").unwrap();
/// assert_eq!(config.tick_hz, 1000);
/// assert!(config.enabled);
/// assert_eq!(config.max_stack_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SliConfig {
    /// Number of counter shards per group (one per execution unit)
    pub units: usize,

    /// Tick frequency used for `period=` (microseconds are rounded up to ticks)
    pub tick_hz: u64,

    /// Byte capacity of each group's diagnostic log; oldest lines are evicted
    pub mbuf_capacity: usize,

    /// Frames captured per diagnostic record
    pub max_stack_depth: usize,

    /// Initial state of the primary switch
    pub enabled: bool,
}

impl Default for SliConfig {
    fn default() -> Self {
        Self {
            units: default_unit_count(),
            tick_hz: 250,
            mbuf_capacity: 64 * 1024,
            max_stack_depth: MAX_STACK_TRACE_DEPTH,
            enabled: false,
        }
    }
}

impl SliConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse latency config")?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid latency config: {}", e))?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read latency config: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.units == 0 {
            return Err("units must be >= 1".to_string());
        }

        if self.tick_hz == 0 || self.tick_hz > 1_000_000 {
            return Err(format!(
                "tick_hz must be in [1, 1000000], got {}",
                self.tick_hz
            ));
        }

        if self.max_stack_depth == 0 || self.max_stack_depth > MAX_STACK_TRACE_DEPTH {
            return Err(format!(
                "max_stack_depth must be in [1, {}], got {}",
                MAX_STACK_TRACE_DEPTH, self.max_stack_depth
            ));
        }

        if self.mbuf_capacity < 256 {
            return Err(format!(
                "mbuf_capacity must be >= 256 bytes, got {}",
                self.mbuf_capacity
            ));
        }

        Ok(())
    }

    pub fn usecs_to_ticks(&self, usecs: u64) -> u64 {
        usecs_to_ticks(usecs, self.tick_hz)
    }

    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(self.tick_hz.max(1));
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

/// Convert microseconds to ticks, rounding up
pub fn usecs_to_ticks(usecs: u64, tick_hz: u64) -> u64 {
    let ticks = (u128::from(usecs) * u128::from(tick_hz)).div_ceil(1_000_000);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = SliConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.units >= 1);
        assert_eq!(config.tick_hz, 250);
        assert!(!config.enabled);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = SliConfig::from_toml_str("").unwrap();
        assert_eq!(config, SliConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(SliConfig::from_toml_str("units = 0").is_err());
        assert!(SliConfig::from_toml_str("tick_hz = 0").is_err());
        assert!(SliConfig::from_toml_str("max_stack_depth = 65").is_err());
        assert!(SliConfig::from_toml_str("mbuf_capacity = 10").is_err());
        assert!(SliConfig::from_toml_str("bogus = 1").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "units = 2\ntick_hz = 100\nmbuf_capacity = 4096").unwrap();
        let config = SliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.units, 2);
        assert_eq!(config.tick_hz, 100);
        assert_eq!(config.mbuf_capacity, 4096);
    }

    #[test]
    fn test_from_missing_file() {
        let err = SliConfig::from_file("/nonexistent/latscope.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read latency config"));
    }

    #[test]
    fn test_tick_conversion() {
        assert_eq!(usecs_to_ticks(0, 250), 0);
        assert_eq!(usecs_to_ticks(1, 250), 1);
        assert_eq!(usecs_to_ticks(4000, 250), 1);
        assert_eq!(usecs_to_ticks(4001, 250), 2);
        assert_eq!(usecs_to_ticks(1_000_000, 1000), 1000);
        assert_eq!(usecs_to_ticks(u64::MAX, 1_000_000), u64::MAX);

        let config = SliConfig {
            tick_hz: 1000,
            ..SliConfig::default()
        };
        assert_eq!(config.ticks_to_nanos(5), 5_000_000);
        assert_eq!(config.usecs_to_ticks(2500), 3);
    }
}
