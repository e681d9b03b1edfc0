//! Purpose: JSON record streams: one JSON value per record, newline terminated.
//! Exports: `JsonWriter`, `JsonReader`, `Values`, `JsonOptions`, `MarshalOptions`,
//! `UnmarshalOptions`, `FieldNaming`.
//! Role: Record codec plus stream layer for JSON; framing is the JSON grammar itself.
//! Invariants: Writers emit compact JSON followed by `\n`; readers accept any whitespace.
//! Invariants: Raw reads/writes bypass marshal options so copied records stay byte-identical.
//! Invariants: Once the byte stream fails to decode, every later read fails too.
use std::io::{self, Read, Write};
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::de::IoRead;
use serde_json::error::Category;
use serde_json::value::RawValue;
use serde_json::{StreamDeserializer, Value};

use crate::core::compression::{Compression, Decoder, Encoder};
use crate::core::error::{Error, ErrorKind};
use crate::core::naming;
use crate::core::record::{RecordReader, RecordWriter, failed_stream_error};

/// Which member names appear on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FieldNaming {
    /// Member names exactly as the record type declares them.
    #[default]
    Declared,
    /// lowerCamelCase struct field names (`account_id` becomes `accountId`).
    /// Map keys are data and keep their spelling.
    Transport,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MarshalOptions {
    pub naming: FieldNaming,
    /// When false, members holding `null`, `false`, `0`, `""`, `[]` or `{}` are omitted.
    pub emit_unpopulated: bool,
}

impl MarshalOptions {
    pub fn new() -> Self {
        Self {
            naming: FieldNaming::Declared,
            emit_unpopulated: true,
        }
    }

    pub fn with_naming(mut self, naming: FieldNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_emit_unpopulated(mut self, emit_unpopulated: bool) -> Self {
        self.emit_unpopulated = emit_unpopulated;
        self
    }
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnmarshalOptions {
    /// When false, input members the target type does not carry are a `SchemaMismatch`.
    /// Either spelling of a field is accepted on read whatever this says.
    pub discard_unknown: bool,
}

impl UnmarshalOptions {
    pub fn new() -> Self {
        Self {
            discard_unknown: true,
        }
    }

    pub fn with_discard_unknown(mut self, discard_unknown: bool) -> Self {
        self.discard_unknown = discard_unknown;
        self
    }
}

impl Default for UnmarshalOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct JsonOptions {
    pub marshal: MarshalOptions,
    pub unmarshal: UnmarshalOptions,
}

pub struct JsonWriter<W: Write> {
    sink: Encoder<W>,
    options: MarshalOptions,
    written: u64,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(sink: W, compression: Compression, buffer_size: usize, options: MarshalOptions) -> Self {
        Self {
            sink: compression.encoder(sink, buffer_size),
            options,
            written: 0,
        }
    }

    pub fn compression(&self) -> Compression {
        self.sink.compression()
    }

    pub fn options(&self) -> MarshalOptions {
        self.options
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<(), Error> {
        let value = match self.options.naming {
            FieldNaming::Declared => serde_json::to_value(record),
            FieldNaming::Transport => naming::to_transport_value(record),
        };
        let mut value = value.map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("record is not representable as JSON")
                .with_record(self.written)
                .with_source(err)
        })?;
        if !self.options.emit_unpopulated {
            drop_unpopulated(&mut value);
        }
        serde_json::to_writer(&mut self.sink, &value)
            .map_err(|err| encode_error(err).with_record(self.written))?;
        self.end_record()
    }

    /// Writes an already-encoded JSON value verbatim.
    pub fn write_raw(&mut self, raw: &RawValue) -> Result<(), Error> {
        self.sink
            .write_all(raw.get().as_bytes())
            .map_err(|err| Error::from_io(err, "failed to write JSON record").with_record(self.written))?;
        self.end_record()
    }

    pub fn close(self) -> Result<(), Error> {
        self.finish().map(drop)
    }

    /// Like `close`, but hands the underlying sink back.
    pub fn finish(self) -> Result<W, Error> {
        self.sink.finish()
    }

    fn end_record(&mut self) -> Result<(), Error> {
        self.sink
            .write_all(b"\n")
            .map_err(|err| Error::from_io(err, "failed to write JSON record").with_record(self.written))?;
        self.written += 1;
        Ok(())
    }
}

impl<W: Write> RecordWriter for JsonWriter<W> {
    type Record = RawValue;

    fn write_record(&mut self, record: &RawValue) -> Result<(), Error> {
        self.write_raw(record)
    }

    fn records_written(&self) -> u64 {
        self.written
    }

    fn close(self) -> Result<(), Error> {
        JsonWriter::close(self)
    }
}

pub struct JsonReader<R: Read> {
    values: StreamDeserializer<'static, IoRead<Decoder<R>>, Box<RawValue>>,
    options: UnmarshalOptions,
    read: u64,
    finished: bool,
    failed: bool,
}

impl<R: Read> JsonReader<R> {
    pub fn new(
        source: R,
        compression: Compression,
        buffer_size: usize,
        options: UnmarshalOptions,
    ) -> Result<Self, Error> {
        let decoder = compression.decoder(source, buffer_size)?;
        Ok(Self {
            values: serde_json::Deserializer::from_reader(decoder).into_iter(),
            options,
            read: 0,
            finished: false,
            failed: false,
        })
    }

    /// Reads the next record into `T`. `Ok(None)` is end of stream.
    ///
    /// Struct fields bind from their declared or lowerCamelCase spelling.
    /// Unknown-member detection compares the input against `T`'s own
    /// serialization, so members `T` skips when serializing count as unknown.
    pub fn read<T>(&mut self) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Serialize,
    {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        let index = self.read - 1;
        let value: Value =
            serde_json::from_str(raw.get()).map_err(|err| decode_error(err).with_record(index))?;
        if self.options.discard_unknown {
            return naming::from_value(value)
                .map(Some)
                .map_err(|err| decode_error(err).with_record(index));
        }

        let record: T = naming::from_value(value.clone())
            .map_err(|err| decode_error(err).with_record(index))?;
        let known = serde_json::to_value(&record).map_err(|err| {
            Error::new(ErrorKind::SchemaMismatch)
                .with_message("target type is not representable as JSON")
                .with_record(index)
                .with_source(err)
        })?;
        if let Some(member) = first_unknown(&value, &known) {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message(format!("unknown member `{member}`"))
                .with_record(index));
        }
        Ok(Some(record))
    }

    pub fn read_value(&mut self) -> Result<Option<Value>, Error> {
        self.read::<Value>()
    }

    /// Next record exactly as it appears in the stream, without options applied.
    pub fn read_raw(&mut self) -> Result<Option<Box<RawValue>>, Error> {
        if self.failed {
            return Err(failed_stream_error(self.read));
        }
        if self.finished {
            return Ok(None);
        }
        match self.values.next() {
            None => {
                self.finished = true;
                Ok(None)
            }
            Some(Ok(raw)) => {
                self.read += 1;
                Ok(Some(raw))
            }
            Some(Err(err)) => {
                self.failed = true;
                Err(decode_error(err).with_record(self.read))
            }
        }
    }

    pub fn values<T>(&mut self) -> Values<'_, R, T>
    where
        T: DeserializeOwned + Serialize,
    {
        Values {
            reader: self,
            _record: PhantomData,
        }
    }

    pub fn close(self) -> Result<(), Error> {
        Ok(())
    }
}

impl<R: Read> RecordReader for JsonReader<R> {
    type Record = Box<RawValue>;

    fn next_record(&mut self) -> Result<Option<Box<RawValue>>, Error> {
        self.read_raw()
    }

    fn records_read(&self) -> u64 {
        self.read
    }
}

pub struct Values<'a, R: Read, T> {
    reader: &'a mut JsonReader<R>,
    _record: PhantomData<fn() -> T>,
}

impl<R: Read, T> Iterator for Values<'_, R, T>
where
    T: DeserializeOwned + Serialize,
{
    type Item = Result<T, Error>;

    /// Yields a stream-level failure once, then ends.
    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.failed {
            return None;
        }
        self.reader.read::<T>().transpose()
    }
}

fn drop_unpopulated(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for inner in map.values_mut() {
                drop_unpopulated(inner);
            }
            map.retain(|_, inner| !is_unpopulated(inner));
        }
        Value::Array(items) => {
            for item in items {
                drop_unpopulated(item);
            }
        }
        _ => {}
    }
}

fn is_unpopulated(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Path of the first input member with no counterpart in `known`, descending
/// through nested objects and element-wise through arrays.
fn first_unknown(input: &Value, known: &Value) -> Option<String> {
    match (input, known) {
        (Value::Object(input), Value::Object(known)) => input.iter().find_map(|(key, inner)| {
            match naming::find_member(known, key) {
                None => Some(key.clone()),
                Some(known_inner) => first_unknown(inner, known_inner).map(|nested| {
                    if nested.starts_with('[') {
                        format!("{key}{nested}")
                    } else {
                        format!("{key}.{nested}")
                    }
                }),
            }
        }),
        (Value::Array(items), Value::Array(known)) => items
            .iter()
            .zip(known)
            .enumerate()
            .find_map(|(i, (item, known_item))| {
                first_unknown(item, known_item).map(|nested| format!("[{i}].{nested}"))
            }),
        _ => None,
    }
}

fn encode_error(err: serde_json::Error) -> Error {
    if err.classify() == Category::Io {
        return Error::from_io(io::Error::from(err), "failed to write JSON record");
    }
    Error::new(ErrorKind::InvalidArgument)
        .with_message("record is not representable as JSON")
        .with_source(err)
}

fn decode_error(err: serde_json::Error) -> Error {
    match err.classify() {
        Category::Io => Error::from_io(io::Error::from(err), "failed to read JSON record"),
        Category::Eof => Error::new(ErrorKind::InvalidFormat)
            .with_message("truncated JSON record")
            .with_source(err),
        Category::Syntax => Error::new(ErrorKind::InvalidFormat)
            .with_message("malformed JSON record")
            .with_source(err),
        Category::Data => Error::new(ErrorKind::SchemaMismatch)
            .with_message("JSON record does not match the target type")
            .with_source(err),
    }
}
