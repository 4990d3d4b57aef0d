//! Chunkline Core - day partitioning of contract-call log streams
//!
//! Provides the record model, UTC day keys, and the [`DailyAccumulator`]
//! that splits an ordered stream of record batches into one flush per
//! calendar day. Persistence is delegated to a [`DaySink`].

pub mod accumulator;
pub mod day;
pub mod error;
pub mod identity;
pub mod logging;
pub mod progress;
pub mod reader;
pub mod record;
pub mod shutdown;

// Re-exports for convenience
pub use accumulator::{DailyAccumulator, DayChunk, DaySink, SubmitOutcome};
pub use day::{DayKey, epoch_seconds, tag_batch};
pub use error::{DayKeyError, SubmitError, TagError};
pub use identity::{MethodSig, StreamId};
pub use logging::{Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use reader::{BatchReader, ReadError, open_records};
pub use record::{Record, TIMESTAMP_FIELD, Value};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
