//! Error types for day tagging and batch submission

use std::fmt;

use crate::day::DayKey;
use crate::record::Record;

/// Failure to derive a day key from a record's timestamp field.
#[derive(Debug, Clone, PartialEq)]
pub enum DayKeyError {
    /// Record has no field at position 0
    Missing,
    /// Timestamp field is null, non-numeric text, or a non-finite float
    NotNumeric(String),
    /// Epoch seconds outside the representable calendar range
    OutOfRange(i64),
}

impl fmt::Display for DayKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "record has no timestamp field"),
            Self::NotNumeric(raw) => write!(f, "timestamp is not numeric: {raw:?}"),
            Self::OutOfRange(secs) => write!(f, "timestamp out of range: {secs}"),
        }
    }
}

impl std::error::Error for DayKeyError {}

/// Day key derivation failure at a given batch position.
#[derive(Debug, Clone, PartialEq)]
pub struct TagError {
    pub index: usize,
    pub source: DayKeyError,
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.index, self.source)
    }
}

impl std::error::Error for TagError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Error from [`DailyAccumulator::submit`](crate::DailyAccumulator::submit).
///
/// `Tag`, `OutOfOrder` and `AlreadyFlushed` are raised before anything is
/// buffered or flushed. `Flush` is raised at the first day whose sink write
/// failed; days committed earlier in the same call stay committed and
/// `remaining` holds every record of the batch that was not.
#[derive(Debug)]
pub enum SubmitError<E> {
    Tag(TagError),
    /// Day key decreases inside the batch or precedes the open day
    OutOfOrder {
        index: usize,
        day: DayKey,
        previous: DayKey,
    },
    /// Record belongs to a day that was already flushed
    AlreadyFlushed {
        index: usize,
        day: DayKey,
        last_flushed: DayKey,
    },
    Flush {
        day: DayKey,
        flushed_days: usize,
        remaining: Vec<Record>,
        source: E,
    },
}

impl<E> SubmitError<E> {
    /// Records to resubmit after the sink recovers. Empty for rejected batches.
    pub fn into_remaining(self) -> Vec<Record> {
        match self {
            Self::Flush { remaining, .. } => remaining,
            _ => Vec::new(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for SubmitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(e) => write!(f, "invalid batch: {e}"),
            Self::OutOfOrder {
                index,
                day,
                previous,
            } => write!(f, "record {index}: day {day} precedes {previous}"),
            Self::AlreadyFlushed {
                index,
                day,
                last_flushed,
            } => write!(
                f,
                "record {index}: day {day} is not after flushed day {last_flushed}"
            ),
            Self::Flush {
                day,
                remaining,
                source,
                ..
            } => write!(
                f,
                "flush of {day} failed ({} records pending): {source}",
                remaining.len()
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for SubmitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tag(e) => Some(e),
            Self::Flush { source, .. } => Some(source),
            Self::OutOfOrder { .. } | Self::AlreadyFlushed { .. } => None,
        }
    }
}

impl<E> From<TagError> for SubmitError<E> {
    fn from(e: TagError) -> Self {
        Self::Tag(e)
    }
}
