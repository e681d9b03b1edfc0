//! Purpose: Define the file service: stream configuration plus the file adapter.
//! Exports: `FileService`, `ApiResult`.
//! Role: Public entry point; opens/creates files and binds JSON or protobuf record streams.
//! Invariants: Compression is resolved once per path (`.gz` means gzip) and never re-derived.
//! Invariants: Configuration is read when a stream is created; later changes do not affect open streams.
#![allow(clippy::result_large_err)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use prost::Message;
use tracing::debug;

use crate::core::compression::{Compression, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::core::error::Error;
use crate::core::json::{JsonOptions, JsonReader, JsonWriter, MarshalOptions, UnmarshalOptions};
use crate::core::proto::{ProtoReader, ProtoWriter};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct FileService {
    buffer_size: usize,
    json: JsonOptions,
}

impl FileService {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            json: JsonOptions::default(),
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.set_buffer_size(size);
        self
    }

    pub fn with_marshal_options(mut self, options: MarshalOptions) -> Self {
        self.json.marshal = options;
        self
    }

    pub fn with_unmarshal_options(mut self, options: UnmarshalOptions) -> Self {
        self.json.unmarshal = options;
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sizes below `MIN_BUFFER_SIZE` are raised to it.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.max(MIN_BUFFER_SIZE);
    }

    pub fn marshal_options(&self) -> MarshalOptions {
        self.json.marshal
    }

    pub fn set_marshal_options(&mut self, options: MarshalOptions) {
        self.json.marshal = options;
    }

    pub fn unmarshal_options(&self) -> UnmarshalOptions {
        self.json.unmarshal
    }

    pub fn set_unmarshal_options(&mut self, options: UnmarshalOptions) {
        self.json.unmarshal = options;
    }

    pub fn json_options(&self) -> JsonOptions {
        self.json
    }

    /// Creates (or truncates) `path` and binds a JSON writer to it.
    pub fn new_json_file(&self, path: impl AsRef<Path>) -> ApiResult<JsonWriter<File>> {
        let (file, compression) = create_file(path.as_ref())?;
        Ok(self.json_writer(file, compression))
    }

    pub fn open_json_file(&self, path: impl AsRef<Path>) -> ApiResult<JsonReader<File>> {
        let path = path.as_ref();
        let (file, compression) = open_file(path)?;
        JsonReader::new(file, compression, self.buffer_size, self.json.unmarshal)
            .map_err(|err| err.with_path(path))
    }

    pub fn new_json_stream<W: Write>(&self, sink: W, gzip: bool) -> JsonWriter<W> {
        self.json_writer(sink, Compression::from_gzip_flag(gzip))
    }

    pub fn json_stream<R: Read>(&self, source: R, gzip: bool) -> ApiResult<JsonReader<R>> {
        JsonReader::new(
            source,
            Compression::from_gzip_flag(gzip),
            self.buffer_size,
            self.json.unmarshal,
        )
    }

    pub fn new_proto_file(&self, path: impl AsRef<Path>) -> ApiResult<ProtoWriter<File>> {
        let (file, compression) = create_file(path.as_ref())?;
        Ok(ProtoWriter::new(file, compression, self.buffer_size))
    }

    /// `M` is the message type every record in the file is decoded as.
    pub fn open_proto_file<M: Message + Default>(
        &self,
        path: impl AsRef<Path>,
    ) -> ApiResult<ProtoReader<File, M>> {
        let path = path.as_ref();
        let (file, compression) = open_file(path)?;
        ProtoReader::new(file, compression, self.buffer_size).map_err(|err| err.with_path(path))
    }

    pub fn new_proto_stream<W: Write>(&self, sink: W, gzip: bool) -> ProtoWriter<W> {
        ProtoWriter::new(sink, Compression::from_gzip_flag(gzip), self.buffer_size)
    }

    pub fn proto_stream<R: Read, M: Message + Default>(
        &self,
        source: R,
        gzip: bool,
    ) -> ApiResult<ProtoReader<R, M>> {
        ProtoReader::new(source, Compression::from_gzip_flag(gzip), self.buffer_size)
    }

    fn json_writer<W: Write>(&self, sink: W, compression: Compression) -> JsonWriter<W> {
        JsonWriter::new(sink, compression, self.buffer_size, self.json.marshal)
    }
}

impl Default for FileService {
    fn default() -> Self {
        Self::new()
    }
}

fn create_file(path: &Path) -> ApiResult<(File, Compression)> {
    let compression = Compression::from_path(path);
    let file = File::create(path).map_err(|err| {
        Error::from_io(err, "failed to create record file").with_path(path)
    })?;
    debug!(path = %path.display(), ?compression, "created record file");
    Ok((file, compression))
}

fn open_file(path: &Path) -> ApiResult<(File, Compression)> {
    let compression = Compression::from_path(path);
    let file = File::open(path)
        .map_err(|err| Error::from_io(err, "failed to open record file").with_path(path))?;
    debug!(path = %path.display(), ?compression, "opened record file");
    Ok((file, compression))
}
