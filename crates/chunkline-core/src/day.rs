//! Calendar-day keys derived from record timestamps

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::error::{DayKeyError, TagError};
use crate::record::{Record, Value};

/// UTC calendar date of a record.
///
/// Keys are full dates: the 1st of January and the 1st of February are
/// different days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn from_timestamp(secs: i64) -> Result<Self, DayKeyError> {
        DateTime::from_timestamp(secs, 0)
            .map(|dt| Self(dt.date_naive()))
            .ok_or(DayKeyError::OutOfRange(secs))
    }

    /// Day key of a record, from its position-0 timestamp
    pub fn of(record: &Record) -> Result<Self, DayKeyError> {
        let field = record.timestamp_field().ok_or(DayKeyError::Missing)?;
        Self::from_timestamp(epoch_seconds(field)?)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Epoch seconds of 00:00:00 UTC; the day covers `[start, start + 86400)`
    pub fn start_timestamp(&self) -> i64 {
        self.0.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// File stamp, `DD_MM_YYYY`
    pub fn stamp(&self) -> String {
        self.0.format("%d_%m_%Y").to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Interpret a timestamp field as whole epoch seconds.
///
/// Floats are floored; numeric text is accepted.
pub fn epoch_seconds(value: &Value) -> Result<i64, DayKeyError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(x) if x.is_finite() => Ok(x.floor() as i64),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| DayKeyError::NotNumeric(s.clone())),
        other => Err(DayKeyError::NotNumeric(format!("{other:?}"))),
    }
}

/// Tag every record of a batch with its day key.
///
/// Fails on the first record whose timestamp cannot be interpreted.
pub fn tag_batch(batch: &[Record]) -> Result<Vec<DayKey>, TagError> {
    batch
        .iter()
        .enumerate()
        .map(|(index, rec)| DayKey::of(rec).map_err(|source| TagError { index, source }))
        .collect()
}
