//! Purpose: Record streams of JSON values and protobuf messages over files or arbitrary byte streams.
//! Exports: `api` (file service, streams, split/join) and `core` (compression, framing, codecs, errors).
//! Role: Library crate; there is no binary.
//! Invariants: A file's compression is derived from its name (`.gz` means gzip) when it is opened.
//! Invariants: End of stream is `Ok(None)`, never an error, and repeats on every later read.
pub mod api;
pub mod core;
