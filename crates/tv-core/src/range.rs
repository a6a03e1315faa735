//! Timeline range value type
//!
//! A [`TimelineRange`] is a `[start, end)` pair of trace timestamps with an
//! optional offset. Ranges are directional: `start` may exceed `end` (a
//! right-to-left drag), and nothing here reorders them. Call sites that
//! compare bounds go through [`TimelineRange::normalized`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Trace timestamp. Trace clocks run in nanoseconds and exceed the range a
/// double can represent exactly, so all arithmetic stays in `i128`.
pub type Timestamp = i128;

/// Immutable timeline range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SerializedRange", into = "SerializedRange")]
pub struct TimelineRange {
    start: Timestamp,
    end: Timestamp,
    offset: Option<Timestamp>,
}

/// Decimal-string form of a range, safe to pass through JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRange {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

impl TimelineRange {
    /// Create a range without an offset
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end,
            offset: None,
        }
    }

    /// Create a range whose accessors report `raw + offset`
    pub fn with_offset(start: Timestamp, end: Timestamp, offset: Option<Timestamp>) -> Self {
        Self { start, end, offset }
    }

    /// Parse a range from its string-triple form
    pub fn from_serialized(serialized: &SerializedRange) -> Result<Self> {
        let start = parse_timestamp("start", &serialized.start)?;
        let end = parse_timestamp("end", &serialized.end)?;
        let offset = match serialized.offset.as_deref() {
            None | Some("") => None,
            Some(text) => Some(parse_timestamp("offset", text)?),
        };
        Ok(Self { start, end, offset })
    }

    /// Start bound with the offset applied, clamped to the `Timestamp` range
    pub fn start(&self) -> Timestamp {
        self.start.saturating_add(self.offset.unwrap_or(0))
    }

    /// End bound with the offset applied
    pub fn end(&self) -> Timestamp {
        self.end.saturating_add(self.offset.unwrap_or(0))
    }

    pub fn raw_start(&self) -> Timestamp {
        self.start
    }

    pub fn raw_end(&self) -> Timestamp {
        self.end
    }

    pub fn offset(&self) -> Option<Timestamp> {
        self.offset
    }

    /// Signed `end - start` on the raw bounds. Negative for reversed ranges.
    pub fn duration(&self) -> Timestamp {
        self.end.saturating_sub(self.start)
    }

    /// True when the range was built right-to-left
    pub fn is_reversed(&self) -> bool {
        self.start > self.end
    }

    /// Copy with the raw bounds in ascending order, offset kept
    pub fn normalized(&self) -> Self {
        if self.is_reversed() {
            Self {
                start: self.end,
                end: self.start,
                offset: self.offset,
            }
        } else {
            *self
        }
    }

    /// Copy of the raw bounds carrying a different offset
    pub fn rebased(&self, offset: Option<Timestamp>) -> Self {
        Self {
            start: self.start,
            end: self.end,
            offset,
        }
    }

    /// String-triple form, offset omitted when unset
    pub fn to_serialized(&self) -> SerializedRange {
        SerializedRange::from(*self)
    }
}

impl From<TimelineRange> for SerializedRange {
    fn from(range: TimelineRange) -> Self {
        SerializedRange {
            start: range.start.to_string(),
            end: range.end.to_string(),
            offset: range.offset.map(|offset| offset.to_string()),
        }
    }
}

impl TryFrom<SerializedRange> for TimelineRange {
    type Error = CoreError;

    fn try_from(serialized: SerializedRange) -> Result<Self> {
        TimelineRange::from_serialized(&serialized)
    }
}

impl fmt::Display for TimelineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)?;
        if let Some(offset) = self.offset {
            write!(f, "+{}", offset)?;
        }
        Ok(())
    }
}

/// Parse user or wire text as a timestamp. Surrounding whitespace is ignored.
pub fn parse_timestamp(field: &'static str, text: &str) -> Result<Timestamp> {
    text.trim()
        .parse::<Timestamp>()
        .map_err(|_| CoreError::parse(field, text))
}
