//! Error types for the latency subsystem
//!
//! Only control-file writes are user-visible failures. Everything else
//! degrades: a group whose allocation fails simply runs unmonitored.

use crate::event::EventFamily;
use thiserror::Error;

/// Rejected control-file write
///
/// Every variant except [`ControlError::OutOfMemory`] maps to an
/// invalid-argument status. A rejected write never changes monitor state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty control directive")]
    Empty,

    #[error("unrecognized control keyword: {0}")]
    UnknownKeyword(String),

    #[error("unknown {family} event in directive: {input}")]
    UnknownEvent { family: EventFamily, input: String },

    #[error("threshold directive needs ',' or ' ' before count=")]
    MissingDelimiter,

    #[error("threshold directive is missing count=")]
    MissingCount,

    #[error("invalid unsigned value: {0:?}")]
    InvalidNumber(String),

    #[error("group has no latency monitor")]
    Unavailable,

    #[error("out of memory while updating active events")]
    OutOfMemory,
}

impl ControlError {
    /// Whether the write was rejected because of malformed input
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, ControlError::OutOfMemory)
    }
}

/// Internal failures of the group lifecycle and capture paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SliError {
    #[error("allocation failed: {0}")]
    AllocationFailed(&'static str),

    #[error("event inheritance failed: {0}")]
    Inheritance(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_classification() {
        assert!(ControlError::Empty.is_invalid_argument());
        assert!(ControlError::MissingCount.is_invalid_argument());
        assert!(ControlError::InvalidNumber("abc".into()).is_invalid_argument());
        assert!(!ControlError::OutOfMemory.is_invalid_argument());
    }

    #[test]
    fn test_error_display() {
        let err = ControlError::UnknownEvent {
            family: EventFamily::MemLat,
            input: "memlat_bogus_threshold=1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown memlat event in directive: memlat_bogus_threshold=1"
        );
        assert_eq!(
            SliError::AllocationFailed("counter shards").to_string(),
            "allocation failed: counter shards"
        );
    }
}
