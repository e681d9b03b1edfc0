// Protobuf record streams: one length-prefixed frame per message, decoded against a caller-supplied message type.
use std::io::{Read, Write};
use std::marker::PhantomData;

use prost::Message;

use crate::core::compression::{Compression, Decoder, Encoder};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{read_frame, write_frame};
use crate::core::record::{RecordReader, RecordWriter, failed_stream_error};

pub struct ProtoWriter<W: Write> {
    sink: Encoder<W>,
    body: Vec<u8>,
    written: u64,
}

impl<W: Write> ProtoWriter<W> {
    pub fn new(sink: W, compression: Compression, buffer_size: usize) -> Self {
        Self {
            sink: compression.encoder(sink, buffer_size),
            body: Vec::new(),
            written: 0,
        }
    }

    pub fn compression(&self) -> Compression {
        self.sink.compression()
    }

    /// Returns the number of bytes the record occupies in the (uncompressed) stream.
    pub fn write<M: Message>(&mut self, message: &M) -> Result<usize, Error> {
        self.body.clear();
        message.encode(&mut self.body).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("failed to encode protobuf record")
                .with_record(self.written)
                .with_source(err)
        })?;
        let n = write_frame(&mut self.sink, &self.body).map_err(|err| err.with_record(self.written))?;
        self.written += 1;
        Ok(n)
    }

    /// Writes already-encoded message bytes as one frame.
    pub fn write_raw(&mut self, body: &[u8]) -> Result<usize, Error> {
        let n = write_frame(&mut self.sink, body).map_err(|err| err.with_record(self.written))?;
        self.written += 1;
        Ok(n)
    }

    pub fn close(self) -> Result<(), Error> {
        self.finish().map(drop)
    }

    pub fn finish(self) -> Result<W, Error> {
        self.sink.finish()
    }
}

impl<W: Write> RecordWriter for ProtoWriter<W> {
    type Record = [u8];

    fn write_record(&mut self, record: &[u8]) -> Result<(), Error> {
        self.write_raw(record).map(drop)
    }

    fn records_written(&self) -> u64 {
        self.written
    }

    fn close(self) -> Result<(), Error> {
        ProtoWriter::close(self)
    }
}

/// Frames carry no type tag; `M` is the schema every frame is decoded with.
pub struct ProtoReader<R: Read, M> {
    source: Decoder<R>,
    body: Vec<u8>,
    read: u64,
    finished: bool,
    failed: bool,
    _message: PhantomData<fn() -> M>,
}

impl<R: Read, M: Message + Default> ProtoReader<R, M> {
    pub fn new(source: R, compression: Compression, buffer_size: usize) -> Result<Self, Error> {
        Ok(Self {
            source: compression.decoder(source, buffer_size)?,
            body: Vec::new(),
            read: 0,
            finished: false,
            failed: false,
            _message: PhantomData,
        })
    }

    /// `Ok(None)` is end of stream and is returned again on every later call.
    pub fn read(&mut self) -> Result<Option<M>, Error> {
        if !self.next_frame()? {
            return Ok(None);
        }
        M::decode(self.body.as_slice())
            .map(Some)
            .map_err(|err| schema_error(err, self.read - 1))
    }

    /// Clears `message` and merges the next record into it. Returns false at end of stream.
    pub fn read_into(&mut self, message: &mut M) -> Result<bool, Error> {
        if !self.next_frame()? {
            return Ok(false);
        }
        message.clear();
        message
            .merge(self.body.as_slice())
            .map_err(|err| schema_error(err, self.read - 1))?;
        Ok(true)
    }

    /// Next frame body, checked to decode as `M` but returned as the original bytes.
    pub fn read_raw(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if !self.next_frame()? {
            return Ok(None);
        }
        M::decode(self.body.as_slice()).map_err(|err| schema_error(err, self.read - 1))?;
        Ok(Some(std::mem::take(&mut self.body)))
    }

    pub fn close(self) -> Result<(), Error> {
        Ok(())
    }

    /// A framing failure is sticky; a schema mismatch leaves the stream usable.
    fn next_frame(&mut self) -> Result<bool, Error> {
        if self.failed {
            return Err(failed_stream_error(self.read));
        }
        if self.finished {
            return Ok(false);
        }
        let more = read_frame(&mut self.source, &mut self.body).map_err(|err| {
            self.failed = true;
            err.with_record(self.read)
        })?;
        if !more {
            self.finished = true;
            return Ok(false);
        }
        self.read += 1;
        Ok(true)
    }
}

impl<R: Read, M: Message + Default> Iterator for ProtoReader<R, M> {
    type Item = Result<M, Error>;

    /// Yields a framing failure once, then ends.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.read().transpose()
    }
}

impl<R: Read, M: Message + Default> RecordReader for ProtoReader<R, M> {
    type Record = Vec<u8>;

    fn next_record(&mut self) -> Result<Option<Vec<u8>>, Error> {
        self.read_raw()
    }

    fn records_read(&self) -> u64 {
        self.read
    }
}

fn schema_error(err: prost::DecodeError, record: u64) -> Error {
    Error::new(ErrorKind::SchemaMismatch)
        .with_message("protobuf record does not match the message type")
        .with_record(record)
        .with_source(err)
}
