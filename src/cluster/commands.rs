//! Cluster control commands used while executing pipelines.

use crate::core::command::Cmd;

/// Creates an ASKING command.
///
/// Sent immediately before a command retried after an ASK redirect. The flag
/// only affects the next command on the same connection.
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}

/// Creates a READONLY command.
///
/// Enables reads from a replica connection for keys whose slot is served by
/// that replica's master.
pub fn readonly() -> Cmd {
    Cmd::new("READONLY")
}
