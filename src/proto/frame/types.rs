use bytes::Bytes;

/// A RESP2 frame, used both for outgoing commands and for replies.
///
/// `Null` doubles as the absent-value marker in multi-key results.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string (+OK).
    SimpleString(Vec<u8>),
    /// Error (-ERR).
    Error(Vec<u8>),
    /// Integer (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar).
    BulkString(Option<Bytes>),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Null ($-1 or *-1).
    Null,
}

impl Frame {
    /// Returns true if this frame represents a missing value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }

    /// Consumes the frame and returns its elements if it is an array.
    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Frame::BulkString(Some(Bytes::copy_from_slice(s.as_bytes())))
    }
}

impl From<i64> for Frame {
    fn from(n: i64) -> Self {
        Frame::Integer(n)
    }
}
