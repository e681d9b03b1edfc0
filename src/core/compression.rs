// Compression mode resolution and the buffered (optionally gzip) byte layers under record streams.
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression as Level;
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
pub const MIN_BUFFER_SIZE: usize = 16;
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const GZIP_EXTENSIONS: &[&str] = &["gz"];

/// Byte-level transform of a stream. Fixed when the stream is created.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    #[default]
    Plain,
    Gzip,
}

impl Compression {
    pub fn from_gzip_flag(gzip: bool) -> Self {
        if gzip {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }

    /// Only the final extension counts; `data.json.gz` is gzip, `data.gz.json` is not.
    pub fn from_path(path: &Path) -> Self {
        let gzip = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                GZIP_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        Self::from_gzip_flag(gzip)
    }

    pub fn is_gzip(self) -> bool {
        self == Compression::Gzip
    }

    pub fn encoder<W: Write>(self, sink: W, buffer_size: usize) -> Encoder<W> {
        let capacity = buffer_size.max(MIN_BUFFER_SIZE);
        match self {
            Compression::Plain => Encoder::Plain(BufWriter::with_capacity(capacity, sink)),
            Compression::Gzip => Encoder::Gzip(BufWriter::with_capacity(
                capacity,
                GzEncoder::new(sink, Level::default()),
            )),
        }
    }

    /// Gzip sources are checked for the gzip magic up front so a bad header
    /// fails here rather than on the first read. An empty source is an empty
    /// stream in either mode.
    pub fn decoder<R: Read>(self, source: R, buffer_size: usize) -> Result<Decoder<R>, Error> {
        let capacity = buffer_size.max(MIN_BUFFER_SIZE);
        let mut source = BufReader::with_capacity(capacity, source);
        if self == Compression::Plain {
            return Ok(Decoder::Plain(source));
        }

        let (empty, magic) = {
            let head = source
                .fill_buf()
                .map_err(|err| Error::from_io(err, "failed to read gzip header"))?;
            (head.is_empty(), head.starts_with(&GZIP_MAGIC))
        };
        if empty {
            return Ok(Decoder::Plain(source));
        }
        if !magic {
            return Err(Error::new(ErrorKind::InvalidFormat).with_message("missing gzip magic"));
        }
        Ok(Decoder::Gzip(BufReader::with_capacity(
            capacity,
            MultiGzDecoder::new(source),
        )))
    }
}

pub enum Encoder<W: Write> {
    Plain(BufWriter<W>),
    Gzip(BufWriter<GzEncoder<W>>),
}

impl<W: Write> Encoder<W> {
    pub fn compression(&self) -> Compression {
        match self {
            Encoder::Plain(_) => Compression::Plain,
            Encoder::Gzip(_) => Compression::Gzip,
        }
    }

    /// Flushes buffered bytes, writes the gzip trailer when compressing, and
    /// flushes the sink before handing it back.
    pub fn finish(self) -> Result<W, Error> {
        let mut sink = match self {
            Encoder::Plain(buf) => buf
                .into_inner()
                .map_err(|err| Error::from_io(err.into_error(), "failed to flush buffered records"))?,
            Encoder::Gzip(buf) => {
                let encoder = buf.into_inner().map_err(|err| {
                    Error::from_io(err.into_error(), "failed to flush buffered records")
                })?;
                encoder
                    .finish()
                    .map_err(|err| Error::from_io(err, "failed to finish gzip stream"))?
            }
        };
        sink.flush()
            .map_err(|err| Error::from_io(err, "failed to flush sink"))?;
        Ok(sink)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(inner) => inner.write(buf),
            Encoder::Gzip(inner) => inner.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Encoder::Plain(inner) => inner.write_all(buf),
            Encoder::Gzip(inner) => inner.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(inner) => inner.flush(),
            Encoder::Gzip(inner) => inner.flush(),
        }
    }
}

pub enum Decoder<R: Read> {
    Plain(BufReader<R>),
    Gzip(BufReader<MultiGzDecoder<BufReader<R>>>),
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Plain(inner) => inner.read(buf),
            Decoder::Gzip(inner) => inner.read(buf),
        }
    }
}

impl<R: Read> BufRead for Decoder<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Decoder::Plain(inner) => inner.fill_buf(),
            Decoder::Gzip(inner) => inner.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Decoder::Plain(inner) => inner.consume(amt),
            Decoder::Gzip(inner) => inner.consume(amt),
        }
    }
}
