//! Purpose: Split a record file into bounded parts and join parts back into one file.
//! Exports: `FileService::{split_json_file, join_json_files, split_proto_file, join_proto_files}`.
//! Role: Record-level copy between files; never touches raw file bytes.
//! Invariants: Every part holds at most `part_size` records, in source order; no empty parts.
//! Invariants: Each file's compression comes from its own name, so parts and source may differ.
//! Invariants: Errors abort immediately; files already written are left for the caller.
#![allow(clippy::result_large_err)]

use std::borrow::Borrow;
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::{debug, info};

use super::service::{ApiResult, FileService};
use crate::core::error::{Error, ErrorKind};
use crate::core::json::{JsonReader, JsonWriter};
use crate::core::proto::{ProtoReader, ProtoWriter};
use crate::core::record::{RecordReader, RecordWriter};

impl FileService {
    /// Splits `source` into parts of at most `part_size` records. `namer` is
    /// called with 0, 1, 2, ... for each part actually created.
    pub fn split_json_file<N>(
        &self,
        source: impl AsRef<Path>,
        part_size: usize,
        namer: N,
    ) -> ApiResult<Vec<PathBuf>>
    where
        N: FnMut(usize) -> PathBuf,
    {
        split(&JsonFormat { service: self }, source.as_ref(), part_size, namer)
    }

    /// Writes every record of `parts`, in the given order, to `dest`.
    pub fn join_json_files<P: AsRef<Path>>(&self, dest: impl AsRef<Path>, parts: &[P]) -> ApiResult<()> {
        join(&JsonFormat { service: self }, dest.as_ref(), parts)
    }

    /// Like `split_json_file`; every record is checked to decode as `M`.
    pub fn split_proto_file<M, N>(
        &self,
        source: impl AsRef<Path>,
        part_size: usize,
        namer: N,
    ) -> ApiResult<Vec<PathBuf>>
    where
        M: Message + Default,
        N: FnMut(usize) -> PathBuf,
    {
        split(&ProtoFormat::<M>::new(self), source.as_ref(), part_size, namer)
    }

    pub fn join_proto_files<M, P>(&self, dest: impl AsRef<Path>, parts: &[P]) -> ApiResult<()>
    where
        M: Message + Default,
        P: AsRef<Path>,
    {
        join(&ProtoFormat::<M>::new(self), dest.as_ref(), parts)
    }
}

/// How to bind record streams to files of one record format.
trait RecordFormat {
    type Reader: RecordReader;
    type Writer: RecordWriter;

    fn open(&self, path: &Path) -> ApiResult<Self::Reader>;
    fn create(&self, path: &Path) -> ApiResult<Self::Writer>;
}

struct JsonFormat<'a> {
    service: &'a FileService,
}

impl RecordFormat for JsonFormat<'_> {
    type Reader = JsonReader<File>;
    type Writer = JsonWriter<File>;

    fn open(&self, path: &Path) -> ApiResult<Self::Reader> {
        self.service.open_json_file(path)
    }

    fn create(&self, path: &Path) -> ApiResult<Self::Writer> {
        self.service.new_json_file(path)
    }
}

struct ProtoFormat<'a, M> {
    service: &'a FileService,
    _message: PhantomData<fn() -> M>,
}

impl<'a, M> ProtoFormat<'a, M> {
    fn new(service: &'a FileService) -> Self {
        Self {
            service,
            _message: PhantomData,
        }
    }
}

impl<M: Message + Default> RecordFormat for ProtoFormat<'_, M> {
    type Reader = ProtoReader<File, M>;
    type Writer = ProtoWriter<File>;

    fn open(&self, path: &Path) -> ApiResult<Self::Reader> {
        self.service.open_proto_file::<M>(path)
    }

    fn create(&self, path: &Path) -> ApiResult<Self::Writer> {
        self.service.new_proto_file(path)
    }
}

fn split<F, N>(format: &F, source: &Path, part_size: usize, mut namer: N) -> ApiResult<Vec<PathBuf>>
where
    F: RecordFormat,
    <F::Reader as RecordReader>::Record: Borrow<<F::Writer as RecordWriter>::Record>,
    N: FnMut(usize) -> PathBuf,
{
    if part_size == 0 {
        return Err(Error::new(ErrorKind::InvalidArgument).with_message("part size must be positive"));
    }

    let mut reader = format.open(source)?;
    let mut parts: Vec<PathBuf> = Vec::new();
    let mut current: Option<F::Writer> = None;

    while let Some(record) = reader.next_record().map_err(|err| err.with_path(source))? {
        let mut writer = match current.take() {
            Some(writer) => writer,
            None => {
                let path = namer(parts.len());
                let writer = format.create(&path)?;
                debug!(part = parts.len(), path = %path.display(), "started part");
                parts.push(path);
                writer
            }
        };
        writer
            .write_record(record.borrow())
            .map_err(|err| err.with_path(part_path(&parts)))?;

        if writer.records_written() >= part_size as u64 {
            writer.close().map_err(|err| err.with_path(part_path(&parts)))?;
            debug!(part = parts.len() - 1, records = part_size, "finished part");
        } else {
            current = Some(writer);
        }
    }

    if let Some(writer) = current {
        let records = writer.records_written();
        writer.close().map_err(|err| err.with_path(part_path(&parts)))?;
        debug!(part = parts.len() - 1, records, "finished part");
    }

    info!(
        source = %source.display(),
        records = reader.records_read(),
        parts = parts.len(),
        "split record file"
    );
    Ok(parts)
}

fn join<F, P>(format: &F, dest: &Path, parts: &[P]) -> ApiResult<()>
where
    F: RecordFormat,
    <F::Reader as RecordReader>::Record: Borrow<<F::Writer as RecordWriter>::Record>,
    P: AsRef<Path>,
{
    let mut writer = format.create(dest)?;
    for part in parts {
        let part = part.as_ref();
        let mut reader = format.open(part)?;
        while let Some(record) = reader.next_record().map_err(|err| err.with_path(part))? {
            writer
                .write_record(record.borrow())
                .map_err(|err| err.with_path(dest))?;
        }
        debug!(part = %part.display(), records = reader.records_read(), "joined part");
    }

    let records = writer.records_written();
    writer.close().map_err(|err| err.with_path(dest))?;
    info!(dest = %dest.display(), records, parts = parts.len(), "joined record files");
    Ok(())
}

fn part_path(parts: &[PathBuf]) -> PathBuf {
    parts.last().cloned().unwrap_or_default()
}
