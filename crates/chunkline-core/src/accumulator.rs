//! Daily chunk accumulator: turns an ordered record stream into one flush per UTC day
//!
//! Batches arrive with arbitrary boundaries. The accumulator buffers the
//! currently open day, and whenever a batch crosses into a later day it hands
//! the completed day to a [`DaySink`] before moving on. A batch spanning many
//! days is peeled one day at a time in a loop.

use crate::day::{DayKey, tag_batch};
use crate::error::SubmitError;
use crate::identity::StreamId;
use crate::record::Record;

/// One completed day of a stream, handed to a [`DaySink`].
#[derive(Debug, Clone, Copy)]
pub struct DayChunk<'a> {
    pub stream: &'a StreamId,
    pub day: DayKey,
    /// Number of days this accumulator flushed before this one
    pub seq: u64,
    pub records: &'a [Record],
}

impl DayChunk<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }
}

/// Destination for completed days.
///
/// `flush` returning `Ok` is the commit point: only then does the accumulator
/// drop the day from its buffer. On `Err` the day stays pending.
pub trait DaySink {
    type Error;

    fn flush(&mut self, chunk: &DayChunk<'_>) -> Result<(), Self::Error>;
}

impl<S: DaySink + ?Sized> DaySink for &mut S {
    type Error = S::Error;

    fn flush(&mut self, chunk: &DayChunk<'_>) -> Result<(), Self::Error> {
        (**self).flush(chunk)
    }
}

/// Result of a successful [`DailyAccumulator::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty batch, nothing to do
    Empty,
    /// Batch absorbed; `flushed_days` days were completed along the way
    Accumulated { flushed_days: usize, buffered: usize },
}

impl SubmitOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn flushed_days(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Accumulated { flushed_days, .. } => *flushed_days,
        }
    }
}

/// Per-stream buffer of the open day.
///
/// Invariant: every buffered record has day key `open_day`, and `open_day`
/// is `None` exactly when the buffer is empty.
#[derive(Debug)]
pub struct DailyAccumulator {
    stream: StreamId,
    buffer: Vec<Record>,
    open_day: Option<DayKey>,
    last_flushed: Option<DayKey>,
    file_counter: u64,
}

impl DailyAccumulator {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            open_day: None,
            last_flushed: None,
            file_counter: 0,
        }
    }

    /// Continue file numbering from `n`, e.g. after a restart
    pub fn with_file_counter(mut self, n: u64) -> Self {
        self.file_counter = n;
        self
    }

    /// Treat `day` as already flushed, so it and earlier days are rejected
    pub fn resume_after(mut self, day: DayKey) -> Self {
        self.mark_flushed_through(day);
        self
    }

    /// Record that `day` was persisted by an earlier run.
    ///
    /// Never moves the last flushed day backwards.
    pub fn mark_flushed_through(&mut self, day: DayKey) {
        self.last_flushed = self.last_flushed.max(Some(day));
    }

    /// Absorb one batch, flushing every day the batch completes.
    ///
    /// Records must be non-decreasing in day across calls. A batch with a
    /// malformed timestamp or a day regression is rejected as a whole before
    /// any state changes.
    pub fn submit<S: DaySink>(
        &mut self,
        batch: Vec<Record>,
        sink: &mut S,
    ) -> Result<SubmitOutcome, SubmitError<S::Error>> {
        if batch.is_empty() {
            log::debug!("{}: empty batch, nothing to do", self.stream);
            return Ok(SubmitOutcome::Empty);
        }

        let tags = tag_batch(&batch)?;
        self.check_order(&tags)?;

        let mut pending = batch.into_iter();
        let mut days = tags.as_slice();
        let mut flushed_days = 0;

        while let (Some(&first), Some(&last)) = (days.first(), days.last()) {
            let reference = self.open_day.unwrap_or(first);

            if reference == last {
                self.buffer.extend(pending.by_ref());
                self.open_day = Some(reference);
                log::debug!(
                    "{}: {} buffered for {}",
                    self.stream,
                    self.buffer.len(),
                    reference
                );
                break;
            }

            // Empty head when the batch opens on a later day than the buffer
            let head = days.iter().take_while(|d| **d == reference).count();
            let staged_from = self.buffer.len();
            self.buffer.extend(pending.by_ref().take(head));

            if let Err(source) = self.commit(reference, sink) {
                let mut remaining = self.buffer.split_off(staged_from);
                remaining.extend(pending);
                return Err(SubmitError::Flush {
                    day: reference,
                    flushed_days,
                    remaining,
                    source,
                });
            }
            flushed_days += 1;
            days = &days[head..];
        }

        Ok(SubmitOutcome::Accumulated {
            flushed_days,
            buffered: self.buffer.len(),
        })
    }

    /// Flush the open day even though it has not been crossed yet.
    ///
    /// Meant for end of a finished backfill. Any later record for the same
    /// day is rejected as `AlreadyFlushed`.
    pub fn flush_open_day<S: DaySink>(
        &mut self,
        sink: &mut S,
    ) -> Result<Option<DayKey>, SubmitError<S::Error>> {
        let Some(day) = self.open_day else {
            return Ok(None);
        };
        self.commit(day, sink)
            .map_err(|source| SubmitError::Flush {
                day,
                flushed_days: 0,
                remaining: Vec::new(),
                source,
            })?;
        Ok(Some(day))
    }

    /// Hand the buffer to the sink; advance state only if it succeeds.
    fn commit<S: DaySink>(&mut self, day: DayKey, sink: &mut S) -> Result<(), S::Error> {
        let chunk = DayChunk {
            stream: &self.stream,
            day,
            seq: self.file_counter,
            records: &self.buffer,
        };
        sink.flush(&chunk)?;

        log::info!(
            "{}: flushed {} ({} records, file #{})",
            self.stream,
            day,
            self.buffer.len(),
            self.file_counter
        );
        self.buffer.clear();
        self.open_day = None;
        self.last_flushed = Some(day);
        self.file_counter += 1;
        Ok(())
    }

    fn check_order<E>(&self, days: &[DayKey]) -> Result<(), SubmitError<E>> {
        if self.open_day.is_none() {
            if let (Some(&day), Some(last_flushed)) = (days.first(), self.last_flushed) {
                if day <= last_flushed {
                    return Err(SubmitError::AlreadyFlushed {
                        index: 0,
                        day,
                        last_flushed,
                    });
                }
            }
        }

        let mut previous = self.open_day;
        for (index, &day) in days.iter().enumerate() {
            if let Some(prev) = previous {
                if day < prev {
                    return Err(SubmitError::OutOfOrder {
                        index,
                        day,
                        previous: prev,
                    });
                }
            }
            previous = Some(day);
        }
        Ok(())
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Records of the open day, in arrival order
    pub fn buffer(&self) -> &[Record] {
        &self.buffer
    }

    pub fn open_day(&self) -> Option<DayKey> {
        self.open_day
    }

    pub fn last_flushed_day(&self) -> Option<DayKey> {
        self.last_flushed
    }

    /// Days flushed so far; also the `seq` of the next chunk
    pub fn file_counter(&self) -> u64 {
        self.file_counter
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    // 2024-03-05T00:00:00Z
    const DAY5: i64 = 1_709_596_800;
    const DAY: i64 = 86_400;

    fn rec(ts: i64, block: i64) -> Record {
        Record::new(vec![Value::Int(ts), Value::Int(block), "0xhash".into()])
    }

    fn on_day(n: i64, block: i64) -> Record {
        rec(DAY5 + (n - 5) * DAY + block, block)
    }

    fn key(d: u32) -> DayKey {
        DayKey::from_ymd(2024, 3, d).unwrap()
    }

    /// Collects flushed chunks; fails the flush whose call index is in `fail_on`
    #[derive(Default)]
    struct RecordingSink {
        flushed: Vec<(DayKey, u64, Vec<Record>)>,
        calls: usize,
        fail_on: Vec<usize>,
    }

    impl DaySink for RecordingSink {
        type Error = std::io::Error;

        fn flush(&mut self, chunk: &DayChunk<'_>) -> Result<(), Self::Error> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_on.contains(&call) {
                return Err(std::io::Error::other("backend down"));
            }
            self.flushed
                .push((chunk.day, chunk.seq, chunk.records.to_vec()));
            Ok(())
        }
    }

    fn acc() -> DailyAccumulator {
        DailyAccumulator::new(StreamId::new("bnb", "Transfer(address,address,uint256)"))
    }

    #[test]
    fn empty_batch_is_noop() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1)], &mut sink).unwrap();

        let outcome = a.submit(Vec::new(), &mut sink).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(a.buffer().len(), 1);
        assert_eq!(sink.calls, 0);
    }

    #[test]
    fn single_day_batch_is_buffered() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        let outcome = a
            .submit(vec![on_day(5, 1), on_day(5, 2)], &mut sink)
            .unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Accumulated {
                flushed_days: 0,
                buffered: 2
            }
        );
        assert!(sink.flushed.is_empty());
        assert_eq!(a.open_day(), Some(key(5)));
    }

    #[test]
    fn crossing_one_boundary_flushes_buffer_plus_head() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1), on_day(5, 2)], &mut sink)
            .unwrap();

        let outcome = a
            .submit(vec![on_day(5, 3), on_day(6, 4), on_day(6, 5)], &mut sink)
            .unwrap();

        assert_eq!(outcome.flushed_days(), 1);
        assert_eq!(sink.flushed.len(), 1);
        let (day, seq, records) = &sink.flushed[0];
        assert_eq!(*day, key(5));
        assert_eq!(*seq, 0);
        assert_eq!(
            records,
            &vec![on_day(5, 1), on_day(5, 2), on_day(5, 3)]
        );
        assert_eq!(a.buffer(), &[on_day(6, 4), on_day(6, 5)]);
        assert_eq!(a.open_day(), Some(key(6)));
    }

    #[test]
    fn three_days_in_one_batch() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        let outcome = a
            .submit(
                vec![on_day(5, 1), on_day(6, 2), on_day(6, 3), on_day(7, 4)],
                &mut sink,
            )
            .unwrap();

        assert_eq!(outcome.flushed_days(), 2);
        let days: Vec<_> = sink.flushed.iter().map(|(d, s, r)| (*d, *s, r.len())).collect();
        assert_eq!(days, vec![(key(5), 0, 1), (key(6), 1, 2)]);
        assert_eq!(a.buffer(), &[on_day(7, 4)]);
        assert_eq!(a.file_counter(), 2);
    }

    #[test]
    fn batch_starting_on_later_day_flushes_buffer_alone() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1)], &mut sink).unwrap();
        a.submit(vec![on_day(6, 2), on_day(6, 3)], &mut sink).unwrap();

        assert_eq!(sink.flushed.len(), 1);
        assert_eq!(sink.flushed[0].2, vec![on_day(5, 1)]);
        assert_eq!(a.buffer().len(), 2);
    }

    #[test]
    fn skipped_days_are_not_invented() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1), on_day(9, 2)], &mut sink).unwrap();

        assert_eq!(sink.flushed.len(), 1);
        assert_eq!(sink.flushed[0].0, key(5));
        assert_eq!(a.open_day(), Some(key(9)));
    }

    #[test]
    fn month_boundary_is_a_day_boundary() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        // 2024-01-01 and 2024-02-01
        let jan_1 = 1_704_067_200;
        let feb_1 = jan_1 + 31 * DAY;
        a.submit(vec![rec(jan_1, 1), rec(feb_1, 2)], &mut sink)
            .unwrap();

        assert_eq!(sink.flushed.len(), 1);
        assert_eq!(sink.flushed[0].0, DayKey::from_ymd(2024, 1, 1).unwrap());
        assert_eq!(a.open_day(), DayKey::from_ymd(2024, 2, 1));
    }

    #[test]
    fn failed_first_flush_leaves_state_untouched() {
        let mut a = acc();
        let mut sink = RecordingSink {
            fail_on: vec![0],
            ..Default::default()
        };
        a.submit(vec![on_day(5, 1), on_day(5, 2)], &mut sink)
            .unwrap();

        let batch = vec![on_day(5, 3), on_day(6, 4), on_day(6, 5)];
        let err = a.submit(batch.clone(), &mut sink).unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Flush {
                flushed_days: 0,
                ..
            }
        ));
        assert_eq!(a.buffer(), &[on_day(5, 1), on_day(5, 2)]);
        assert_eq!(a.open_day(), Some(key(5)));
        assert_eq!(a.file_counter(), 0);
        assert_eq!(err.into_remaining(), batch);
    }

    #[test]
    fn retry_after_failure_is_lossless() {
        let mut a = acc();
        let mut sink = RecordingSink {
            fail_on: vec![1],
            ..Default::default()
        };
        let batch = vec![on_day(5, 1), on_day(6, 2), on_day(7, 3), on_day(7, 4)];
        let err = a.submit(batch, &mut sink).unwrap_err();

        // Day 5 committed, day 6 failed
        assert_eq!(sink.flushed.len(), 1);
        assert!(a.is_empty());
        assert_eq!(a.last_flushed_day(), Some(key(5)));
        let remaining = err.into_remaining();
        assert_eq!(remaining, vec![on_day(6, 2), on_day(7, 3), on_day(7, 4)]);

        a.submit(remaining, &mut sink).unwrap();
        let days: Vec<_> = sink.flushed.iter().map(|(d, s, _)| (*d, *s)).collect();
        assert_eq!(days, vec![(key(5), 0), (key(6), 1)]);
        assert_eq!(a.buffer(), &[on_day(7, 3), on_day(7, 4)]);
    }

    #[test]
    fn malformed_timestamp_rejects_whole_batch() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1)], &mut sink).unwrap();

        let bad = Record::new(vec![Value::Text("soon".into())]);
        let err = a
            .submit(vec![on_day(6, 2), bad], &mut sink)
            .unwrap_err();

        assert!(matches!(err, SubmitError::Tag(ref e) if e.index == 1));
        assert_eq!(sink.calls, 0);
        assert_eq!(a.buffer(), &[on_day(5, 1)]);
    }

    #[test]
    fn regression_inside_batch_is_rejected() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        let err = a
            .submit(vec![on_day(6, 1), on_day(5, 2)], &mut sink)
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::OutOfOrder { index: 1, .. }
        ));
        assert!(a.is_empty());
    }

    #[test]
    fn regression_before_open_day_is_rejected() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(6, 1)], &mut sink).unwrap();
        let err = a.submit(vec![on_day(5, 2)], &mut sink).unwrap_err();
        assert!(matches!(err, SubmitError::OutOfOrder { index: 0, .. }));
    }

    #[test]
    fn flushed_day_is_never_reopened() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        a.submit(vec![on_day(5, 1)], &mut sink).unwrap();
        a.flush_open_day(&mut sink).unwrap();

        let err = a.submit(vec![on_day(5, 2)], &mut sink).unwrap_err();
        assert!(matches!(err, SubmitError::AlreadyFlushed { .. }));
        assert_eq!(sink.flushed.len(), 1);
    }

    #[test]
    fn flush_open_day() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        assert_eq!(a.flush_open_day(&mut sink).unwrap(), None);

        a.submit(vec![on_day(5, 1), on_day(5, 2)], &mut sink)
            .unwrap();
        assert_eq!(a.flush_open_day(&mut sink).unwrap(), Some(key(5)));
        assert!(a.is_empty());
        assert_eq!(a.open_day(), None);
        assert_eq!(sink.flushed[0].2.len(), 2);
    }

    #[test]
    fn failed_open_day_flush_keeps_buffer() {
        let mut a = acc();
        let mut sink = RecordingSink {
            fail_on: vec![0],
            ..Default::default()
        };
        a.submit(vec![on_day(5, 1)], &mut sink).unwrap();
        assert!(a.flush_open_day(&mut sink).is_err());
        assert_eq!(a.buffer(), &[on_day(5, 1)]);
        assert_eq!(a.open_day(), Some(key(5)));
    }

    #[test]
    fn many_days_in_one_batch_do_not_recurse() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        let batch: Vec<_> = (0..20_000).map(|i| rec(DAY5 + i * DAY, i)).collect();
        let outcome = a.submit(batch, &mut sink).unwrap();

        assert_eq!(outcome.flushed_days(), 19_999);
        assert!(sink.flushed.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(a.buffer().len(), 1);
    }

    #[test]
    fn sink_by_mutable_reference() {
        let mut a = acc();
        let mut sink = RecordingSink::default();
        let mut by_ref = &mut sink;
        a.submit(vec![on_day(5, 1), on_day(6, 2)], &mut by_ref)
            .unwrap();
        assert_eq!(sink.flushed.len(), 1);
    }

    #[test]
    fn resumed_accumulator_rejects_flushed_days() {
        let mut a = acc().resume_after(key(6)).with_file_counter(40);
        let mut sink = RecordingSink::default();

        let err = a.submit(vec![on_day(6, 1)], &mut sink).unwrap_err();
        assert!(matches!(err, SubmitError::AlreadyFlushed { .. }));

        a.submit(vec![on_day(7, 2), on_day(8, 3)], &mut sink).unwrap();
        assert_eq!(sink.flushed[0].1, 40);
        assert_eq!(a.file_counter(), 41);
    }

    #[test]
    fn marking_flushed_never_moves_backwards() {
        let mut a = acc();
        a.mark_flushed_through(key(6));
        a.mark_flushed_through(key(4));
        assert_eq!(a.last_flushed_day(), Some(key(6)));

        let mut sink = RecordingSink::default();
        let err = a.submit(vec![on_day(5, 1)], &mut sink).unwrap_err();
        assert!(matches!(err, SubmitError::AlreadyFlushed { .. }));
        assert!(sink.flushed.is_empty());
    }
}
