//! Purpose: Define the public Rust API boundary for record files and streams.
//! Exports: `FileService` plus the stream, option, and error types it hands out.
//! Role: Public, additive-only surface; `core` holds the codecs behind it.
//! Invariants: Callers reach files and streams through `FileService`.
//! Invariants: Stream handles are single-owner; none of them lock internally.

mod service;
mod split;

pub use crate::core::compression::{Compression, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::json::{
    FieldNaming, JsonOptions, JsonReader, JsonWriter, MarshalOptions, UnmarshalOptions, Values,
};
pub use crate::core::proto::{ProtoReader, ProtoWriter};
pub use crate::core::record::{RecordReader, RecordWriter};
pub use service::{ApiResult, FileService};
