//! Replay source: JSON-lines record files, optionally gzip-compressed
//!
//! Each non-blank line is one JSON array (a [`Record`]). Lines are grouped
//! into batches of a fixed size, mimicking the crawler's delivery.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::day::DayKey;
use crate::record::Record;

/// Buffer size for gzip stream reader (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Initial capacity for per-line read buffer
const LINE_BUF_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum ReadError {
    Io(io::Error),
    /// Line is not a JSON array of scalars
    Parse { line: usize, message: String },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Parse { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { .. } => None,
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Open a record file. `-` is stdin; `*.gz` is decompressed on the fly.
pub fn open_records(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::with_capacity(
            GZIP_BUF_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Resume filter: drop records at or below an already persisted block
#[derive(Debug, Clone, Copy)]
struct SkipThrough {
    column: usize,
    block: i64,
}

/// Groups a line-oriented record source into batches.
pub struct BatchReader {
    reader: Box<dyn BufRead + Send>,
    batch_size: usize,
    skip: Option<SkipThrough>,
    buf: String,
    lines_read: usize,
    records_skipped: usize,
    last_skipped_day: Option<DayKey>,
}

impl BatchReader {
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, ReadError> {
        Ok(Self::new(open_records(path)?, batch_size))
    }

    pub fn new(reader: Box<dyn BufRead + Send>, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            skip: None,
            buf: String::with_capacity(LINE_BUF_CAPACITY),
            lines_read: 0,
            records_skipped: 0,
            last_skipped_day: None,
        }
    }

    /// Skip records whose `column` holds an integer `<= block`.
    ///
    /// Records where the column is missing or not an integer are kept.
    pub fn skip_through(mut self, column: usize, block: i64) -> Self {
        self.skip = Some(SkipThrough { column, block });
        self
    }

    /// Next batch, or `None` at end of input. The last batch may be short.
    pub fn next_batch(&mut self) -> Result<Option<Vec<Record>>, ReadError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                break;
            }
            self.lines_read += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            let record: Record =
                serde_json::from_str(line).map_err(|e| ReadError::Parse {
                    line: self.lines_read,
                    message: e.to_string(),
                })?;

            if self.is_persisted(&record) {
                self.records_skipped += 1;
                if let Ok(day) = DayKey::of(&record) {
                    self.last_skipped_day = self.last_skipped_day.max(Some(day));
                }
                continue;
            }
            batch.push(record);
        }
        Ok((!batch.is_empty()).then_some(batch))
    }

    fn is_persisted(&self, record: &Record) -> bool {
        let Some(skip) = self.skip else {
            return false;
        };
        record
            .get(skip.column)
            .and_then(|v| v.as_integer())
            .is_some_and(|block| block <= skip.block)
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    pub fn records_skipped(&self) -> usize {
        self.records_skipped
    }

    /// Latest day among skipped records, i.e. the last day already persisted
    pub fn last_skipped_day(&self) -> Option<DayKey> {
        self.last_skipped_day
    }
}

impl Iterator for BatchReader {
    type Item = Result<Vec<Record>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}
