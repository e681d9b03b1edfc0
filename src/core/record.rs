//! Purpose: Format-neutral record stream traits.
//! Exports: `RecordReader`, `RecordWriter`.
//! Role: Seam that split/join is written against; implemented by the JSON and protobuf streams.
//! Invariants: Records move in framed form (raw JSON text, validated protobuf bytes), so
//! copying a record from a reader to a writer reproduces its bytes exactly.
//! Invariants: `Ok(None)` from `next_record` is end of stream and repeats on every later call.
//! Invariants: After a stream-level decode failure, every later read is an error, never `Ok(None)`.

use crate::core::error::{Error, ErrorKind};

pub trait RecordReader {
    type Record;

    fn next_record(&mut self) -> Result<Option<Self::Record>, Error>;

    /// Number of records returned so far.
    fn records_read(&self) -> u64;
}

pub trait RecordWriter {
    type Record: ?Sized;

    fn write_record(&mut self, record: &Self::Record) -> Result<(), Error>;

    /// Number of records accepted so far.
    fn records_written(&self) -> u64;

    fn close(self) -> Result<(), Error>
    where
        Self: Sized;
}

/// Returned by readers whose byte stream already failed to decode.
pub(crate) fn failed_stream_error(record: u64) -> Error {
    Error::new(ErrorKind::InvalidFormat)
        .with_message("stream failed to decode earlier; no further records are readable")
        .with_record(record)
}
