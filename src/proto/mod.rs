//! RESP (Redis Serialization Protocol) codec.
//!
//! - [`codec`] - Encoder and decoder for RESP2 frames
//! - [`error`] - Error types shared by the whole crate
//! - [`frame`] - Frame types representing RESP data structures

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
