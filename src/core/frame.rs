// Length-prefixed frames: `[u32 big-endian body length][body]`, one per protobuf record.
use std::io::{self, Read, Write};

use crate::core::error::{Error, ErrorKind};

pub const FRAME_PREFIX_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub fn encode_prefix(body_len: usize) -> Result<[u8; FRAME_PREFIX_LEN], Error> {
    if body_len > MAX_FRAME_LEN {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("record of {body_len} bytes exceeds max frame length")));
    }
    Ok((body_len as u32).to_be_bytes())
}

pub fn decode_prefix(prefix: [u8; FRAME_PREFIX_LEN]) -> Result<usize, Error> {
    let body_len = u32::from_be_bytes(prefix) as usize;
    if body_len > MAX_FRAME_LEN {
        return Err(Error::new(ErrorKind::InvalidFormat)
            .with_message(format!("frame length {body_len} exceeds max")));
    }
    Ok(body_len)
}

/// Returns the number of bytes the frame occupies on the wire.
pub fn write_frame<W: Write>(sink: &mut W, body: &[u8]) -> Result<usize, Error> {
    let prefix = encode_prefix(body.len())?;
    sink.write_all(&prefix)
        .map_err(|err| Error::from_io(err, "failed to write frame prefix"))?;
    sink.write_all(body)
        .map_err(|err| Error::from_io(err, "failed to write frame body"))?;
    Ok(FRAME_PREFIX_LEN + body.len())
}

/// Reads the next frame body into `body`, replacing its contents.
///
/// `Ok(false)` means the source ended exactly on a frame boundary. A source
/// that ends inside the prefix or the body is `InvalidFormat`.
pub fn read_frame<R: Read>(source: &mut R, body: &mut Vec<u8>) -> Result<bool, Error> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    let filled = read_up_to(source, &mut prefix)
        .map_err(|err| Error::from_io(err, "failed to read frame prefix"))?;
    if filled == 0 {
        return Ok(false);
    }
    if filled < FRAME_PREFIX_LEN {
        return Err(Error::new(ErrorKind::InvalidFormat)
            .with_message(format!("truncated frame prefix ({filled} of {FRAME_PREFIX_LEN} bytes)")));
    }

    let body_len = decode_prefix(prefix)?;
    body.clear();
    // Grows with the bytes actually present, not with the declared length.
    let filled = source
        .by_ref()
        .take(body_len as u64)
        .read_to_end(body)
        .map_err(|err| Error::from_io(err, "failed to read frame body"))?;
    if filled < body_len {
        return Err(Error::new(ErrorKind::InvalidFormat)
            .with_message(format!("truncated frame body ({filled} of {body_len} bytes)")));
    }
    Ok(true)
}

fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::{FRAME_PREFIX_LEN, MAX_FRAME_LEN, decode_prefix, read_frame, write_frame};
    use crate::core::error::ErrorKind;

    #[test]
    fn prefix_is_big_endian_length() {
        let mut wire = Vec::new();
        let written = write_frame(&mut wire, b"abc").expect("write");
        assert_eq!(written, FRAME_PREFIX_LEN + 3);
        assert_eq!(wire, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn frames_are_read_in_order_then_eof() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").expect("write");
        write_frame(&mut wire, b"").expect("write");
        write_frame(&mut wire, b"third").expect("write");

        let mut source = wire.as_slice();
        let mut body = Vec::new();
        assert!(read_frame(&mut source, &mut body).expect("read"));
        assert_eq!(body, b"first");
        assert!(read_frame(&mut source, &mut body).expect("read"));
        assert!(body.is_empty());
        assert!(read_frame(&mut source, &mut body).expect("read"));
        assert_eq!(body, b"third");
        assert!(!read_frame(&mut source, &mut body).expect("eof"));
        assert!(!read_frame(&mut source, &mut body).expect("eof again"));
    }

    #[test]
    fn truncated_prefix_is_invalid_format() {
        let mut source: &[u8] = &[0, 0];
        let err = read_frame(&mut source, &mut Vec::new()).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn truncated_body_is_invalid_format() {
        let mut source: &[u8] = &[0, 0, 0, 8, 1, 2, 3];
        let err = read_frame(&mut source, &mut Vec::new()).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn huge_declared_length_over_short_input_stays_small() {
        let mut source: &[u8] = &[0x0f, 0xff, 0xff, 0xff, 1, 2, 3];
        let mut body = Vec::new();
        let err = read_frame(&mut source, &mut body).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        assert_eq!(body, [1, 2, 3]);
        assert!(body.capacity() < 1024 * 1024);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let prefix = ((MAX_FRAME_LEN as u32) + 1).to_be_bytes();
        let err = decode_prefix(prefix).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }
}
