use std::io;

use thiserror::Error;

/// Result type alias for slotpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while routing, executing or decoding cluster commands.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// A protocol error occurred.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// Decoding failed.
    #[error("decode error: {source}")]
    Decode {
        /// Underlying decode error.
        #[from]
        source: DecodeError,
    },

    /// A network operation did not complete in time.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        /// The operation that timed out (e.g. "connect", "read").
        operation: &'static str,
        /// The configured limit in milliseconds.
        elapsed_ms: u64,
    },

    /// No usable connection to a node.
    ///
    /// Recorded on every command of a batch whose connection could not be
    /// acquired or broke while the batch was in flight.
    #[error("connection to {address} failed: {message}")]
    Connection {
        /// The node address.
        address: String,
        /// Description of the failure.
        message: String,
    },

    /// Key moved to another node (permanent redirect).
    ///
    /// The slot has been migrated; the slot map is stale and the command
    /// must be retried on the named node.
    #[error("MOVED to slot {slot} at {address}")]
    Moved {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node owning this slot (e.g., "127.0.0.1:7001").
        address: String,
    },

    /// Temporary redirect during slot migration (ASK redirect).
    ///
    /// The command must be retried on the named node preceded by `ASKING`.
    /// The slot map is left untouched.
    #[error("ASK to slot {slot} at {address}")]
    Ask {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node temporarily handling this slot.
        address: String,
    },

    /// The cluster is down or unavailable.
    #[error("CLUSTERDOWN cluster is down")]
    ClusterDown,

    /// Multi-key operation with keys in different slots.
    #[error("CROSSSLOT keys in multi-key operation map to different slots")]
    CrossSlot,

    /// A multi-key command received a malformed argument list.
    #[error("wrong number of arguments for {command}: got {count}")]
    ArgumentCount {
        /// The command being built.
        command: &'static str,
        /// The number of arguments supplied.
        count: usize,
    },

    /// Bulk slot resolution returned a different number of addresses than requested.
    #[error("address count {actual} didn't match command count {expected}")]
    RoutingMismatch {
        /// Number of commands queued.
        expected: usize,
        /// Number of addresses returned.
        actual: usize,
    },

    /// `receive` was called before `flush`.
    #[error("pipeline must be flushed before receive")]
    NotFlushed,

    /// `receive` was called more times than commands were sent.
    #[error("no more replies in pipeline")]
    NoMoreReplies,
}

impl Error {
    /// Returns true for errors that were produced by the server's reply
    /// rather than by the client or the transport.
    pub fn is_server_reply(&self) -> bool {
        matches!(
            self,
            Error::Server { .. }
                | Error::Moved { .. }
                | Error::Ask { .. }
                | Error::ClusterDown
                | Error::CrossSlot
        )
    }
}

/// Error returned when frame decoding fails.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    /// Creates a new decode error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
