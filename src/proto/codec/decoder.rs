use bytes::{Buf, Bytes, BytesMut};

use crate::proto::error::DecodeError;
use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// A streaming RESP2 decoder.
///
/// Bytes are accumulated with [`append`](Decoder::append) and complete frames
/// are taken out with [`decode`](Decoder::decode). Nothing is consumed from
/// the buffer until a whole frame (including every nested array element) is
/// available, so a pipelined reply stream can be fed in arbitrary chunks.
///
/// # Example
///
/// ```
/// use slotpipe::proto::codec::Decoder;
/// use slotpipe::proto::frame::Frame;
///
/// let mut decoder = Decoder::new();
/// decoder.append(b"+OK\r\n:1\r\n");
/// assert_eq!(decoder.decode().unwrap(), Some(Frame::SimpleString(b"OK".to_vec())));
/// assert_eq!(decoder.decode().unwrap(), Some(Frame::Integer(1)));
/// assert_eq!(decoder.decode().unwrap(), None);
/// ```
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a new decoder with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends raw bytes received from the network.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode one frame.
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn decode(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match self.parse(0)? {
            Some((frame, end)) => {
                self.buf.advance(end);
                Ok(Some(frame))
            }
            None => {
                if self.buf.len() > self.max_frame_size {
                    return Err(DecodeError::new(
                        "buffer size exceeded maximum frame size",
                    ));
                }
                Ok(None)
            }
        }
    }

    /// Parses a frame starting at `pos`, returning it with the offset just past it.
    fn parse(&self, pos: usize) -> Result<Option<(Frame, usize)>, DecodeError> {
        let Some(line_end) = self.find_crlf(pos) else {
            return Ok(None);
        };
        if line_end == pos {
            return Err(DecodeError::new("missing frame type"));
        }
        let line = &self.buf[pos + 1..line_end];
        let next = line_end + 2;

        match self.buf[pos] {
            b'+' => Ok(Some((Frame::SimpleString(line.to_vec()), next))),
            b'-' => Ok(Some((Frame::Error(line.to_vec()), next))),
            b':' => Ok(Some((Frame::Integer(parse_int(line)?), next))),
            b'$' => {
                let len = parse_int(line)?;
                if len < 0 {
                    return Ok(Some((Frame::BulkString(None), next)));
                }
                let len = len as usize;
                if len > self.max_frame_size {
                    return Err(DecodeError::new(
                        "bulk string length exceeds maximum frame size",
                    ));
                }
                if self.buf.len() < next + len + 2 {
                    return Ok(None);
                }
                if &self.buf[next + len..next + len + 2] != b"\r\n" {
                    return Err(DecodeError::new("bulk string missing terminator"));
                }
                let data = Bytes::copy_from_slice(&self.buf[next..next + len]);
                Ok(Some((Frame::BulkString(Some(data)), next + len + 2)))
            }
            b'*' => {
                let len = parse_int(line)?;
                if len < 0 {
                    return Ok(Some((Frame::Null, next)));
                }
                let len = len as usize;
                // every element needs at least 3 bytes (type byte + CRLF)
                if len > self.max_frame_size / 3 {
                    return Err(DecodeError::new("array length exceeds maximum frame size"));
                }
                let mut items = Vec::with_capacity(len.min(1024));
                let mut cursor = next;
                for _ in 0..len {
                    match self.parse(cursor)? {
                        Some((item, end)) => {
                            items.push(item);
                            cursor = end;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((Frame::Array(items), cursor)))
            }
            other => Err(DecodeError::new(format!(
                "unknown frame type: {}",
                other as char
            ))),
        }
    }

    /// Finds the index of the `\r` of the next CRLF at or after `from`.
    fn find_crlf(&self, from: usize) -> Option<usize> {
        self.buf
            .get(from..)?
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|i| from + i)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_int(line: &[u8]) -> Result<i64, DecodeError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| DecodeError::new("invalid integer in frame header"))
}
