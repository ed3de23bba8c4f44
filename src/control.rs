//! Control-file directive parsing
//!
//! One directive per write:
//! - `<family>_<name>_threshold=<u64>[,| ]count=<u64>`
//! - `period=<u64>` (microseconds)
//! - `mbuf_enable=<u64>` (nonzero enables)
//!
//! Numbers follow kernel `kstrtou64` rules: `0x` prefix for hex, a leading
//! `0` for octal, decimal otherwise. A user-supplied `0` threshold or count
//! means "disabled" and becomes `None`.

use crate::config::usecs_to_ticks;
use crate::error::ControlError;
use crate::event::{EventFamily, EventId};

/// A parsed configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDirective {
    Threshold {
        event: EventId,
        threshold: Option<u64>,
        count: Option<u64>,
    },
    Period {
        ticks: u64,
    },
    MbufEnable(bool),
}

#[derive(Debug, Clone, Copy)]
enum Keyword {
    Family(EventFamily),
    Period,
    MbufEnable,
}

/// Checked in order; the first matching prefix wins
const KEYWORDS: [(&str, Keyword); 5] = [
    ("schedlat_", Keyword::Family(EventFamily::SchedLat)),
    ("memlat_", Keyword::Family(EventFamily::MemLat)),
    ("longterm_", Keyword::Family(EventFamily::LongTerm)),
    ("period=", Keyword::Period),
    ("mbuf_enable=", Keyword::MbufEnable),
];

const THRESHOLD_SUFFIX: &str = "_threshold=";
const COUNT_KEY: &str = "count=";

/// Parse one control directive
///
/// # Example
/// ```
/// use latscope::control::{parse_directive, ControlDirective};
/// use latscope::event::{EventId, SchedLatEvent};
///
/// let d = parse_directive("schedlat_wait_threshold=100,count=5", 250).unwrap();
/// assert_eq!(
///     d,
///     ControlDirective::Threshold {
///         event: EventId::Sched(SchedLatEvent::Wait),
///         threshold: Some(100),
///         count: Some(5),
///     }
/// );
/// ```
pub fn parse_directive(input: &str, tick_hz: u64) -> Result<ControlDirective, ControlError> {
    let buf = input.trim();
    if buf.is_empty() {
        return Err(ControlError::Empty);
    }

    let (prefix, keyword) = KEYWORDS
        .iter()
        .find(|(prefix, _)| buf.starts_with(prefix))
        .ok_or_else(|| ControlError::UnknownKeyword(buf.to_string()))?;
    let rest = &buf[prefix.len()..];

    match keyword {
        Keyword::Family(family) => parse_threshold(buf, *family),
        Keyword::Period => Ok(ControlDirective::Period {
            ticks: usecs_to_ticks(parse_u64(rest)?, tick_hz),
        }),
        Keyword::MbufEnable => Ok(ControlDirective::MbufEnable(parse_u64(rest)? != 0)),
    }
}

fn parse_threshold(buf: &str, family: EventFamily) -> Result<ControlDirective, ControlError> {
    let (event, rest) = (0..family.event_count())
        .filter_map(|i| family.event(i))
        .find_map(|event| {
            buf.strip_prefix(event.name())
                .and_then(|r| r.strip_prefix(THRESHOLD_SUFFIX))
                .map(|r| (event, r))
        })
        .ok_or_else(|| ControlError::UnknownEvent {
            family,
            input: buf.to_string(),
        })?;

    let split = rest
        .find(|c: char| c == ',' || c == ' ')
        .ok_or(ControlError::MissingDelimiter)?;
    let threshold = to_limit(parse_u64(&rest[..split])?);

    let tail = &rest[split + 1..];
    let count_at = tail.find(COUNT_KEY).ok_or(ControlError::MissingCount)?;
    let count = to_limit(parse_u64(&tail[count_at + COUNT_KEY.len()..])?);

    Ok(ControlDirective::Threshold {
        event,
        threshold,
        count,
    })
}

/// User value to internal limit: `0` disables
fn to_limit(value: u64) -> Option<u64> {
    (value != 0 && value != u64::MAX).then_some(value)
}

/// Internal limit to the value shown to users: disabled shows as `0`
pub fn display_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(0)
}

/// Parse an unsigned integer with `kstrtou64` base detection
pub fn parse_u64(input: &str) -> Result<u64, ControlError> {
    let invalid = || ControlError::InvalidNumber(input.to_string());

    let s = input.strip_suffix('\n').unwrap_or(input);
    let s = s.strip_prefix('+').unwrap_or(s);
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    u64::from_str_radix(digits, radix).map_err(|_| invalid())
}
