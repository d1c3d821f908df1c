use bytes::{BufMut, BytesMut};

use crate::proto::frame::Frame;

/// A RESP2 encoder that accumulates frames in an internal buffer.
///
/// Several frames can be encoded back to back before the buffer is taken,
/// which is how a pipelined batch is written in a single network write.
///
/// # Example
///
/// ```
/// use slotpipe::proto::codec::Encoder;
/// use slotpipe::proto::frame::Frame;
///
/// let mut encoder = Encoder::new();
/// encoder.encode(&Frame::SimpleString(b"OK".to_vec()));
/// encoder.encode(&Frame::Integer(1));
/// assert_eq!(&encoder.take()[..], b"+OK\r\n:1\r\n");
/// ```
#[derive(Debug)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends the wire form of `frame` to the buffer.
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::SimpleString(s) => self.put_line(b'+', s),
            Frame::Error(e) => self.put_line(b'-', e),
            Frame::Integer(n) => self.put_line(b':', n.to_string().as_bytes()),
            Frame::BulkString(Some(data)) => {
                self.put_line(b'$', data.len().to_string().as_bytes());
                self.buf.extend_from_slice(data);
                self.buf.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(None) | Frame::Null => self.buf.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                self.put_line(b'*', items.len().to_string().as_bytes());
                for item in items {
                    self.encode(item);
                }
            }
        }
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Takes the encoded data, leaving the encoder empty and reusable.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    fn put_line(&mut self, prefix: u8, body: &[u8]) {
        self.buf.put_u8(prefix);
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
