//! RESP2 encoder and streaming decoder.

/// Incremental decoding of replies from a byte stream.
pub mod decoder;
/// Buffered encoding of outgoing frames.
pub mod encoder;

pub use decoder::Decoder;
pub use encoder::Encoder;
