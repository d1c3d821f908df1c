//! Parsing of cluster error replies.
//!
//! Nodes answer with special error replies when they do not own a slot:
//! - `MOVED <slot> <host>:<port>` - the slot has a new permanent owner
//! - `ASK <slot> <host>:<port>` - the slot is migrating, retry once elsewhere
//! - `CLUSTERDOWN ...` - the cluster cannot serve requests

use std::fmt;

use crate::Error;

/// The two kinds of redirect a node can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Ownership moved; the slot map is stale.
    Moved,
    /// Temporary redirect during migration; the slot map stays valid.
    Ask,
}

/// A parsed redirect directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Moved or Ask.
    pub kind: RedirectKind,
    /// The slot the command hashed to.
    pub slot: u16,
    /// The node that should receive the retried command.
    pub address: String,
}

impl Redirect {
    /// Extracts a redirect from a typed error, if it carries one.
    pub fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::Moved { slot, address } => Some(Self {
                kind: RedirectKind::Moved,
                slot: *slot,
                address: address.clone(),
            }),
            Error::Ask { slot, address } => Some(Self {
                kind: RedirectKind::Ask,
                slot: *slot,
                address: address.clone(),
            }),
            _ => None,
        }
    }

    /// Returns true for permanent (MOVED) redirects.
    pub fn is_moved(&self) -> bool {
        self.kind == RedirectKind::Moved
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RedirectKind::Moved => "MOVED",
            RedirectKind::Ask => "ASK",
        };
        write!(f, "{} {} {}", kind, self.slot, self.address)
    }
}

/// Converts the text of an error reply into a typed error.
///
/// Anything that is not a well-formed cluster directive becomes
/// [`Error::Server`] carrying the original message.
pub fn parse_redis_error(error_msg: &[u8]) -> Error {
    let msg = String::from_utf8_lossy(error_msg);
    let msg = msg.trim();

    if let Some((slot, address)) = msg.strip_prefix("MOVED ").and_then(parse_redirect) {
        return Error::Moved { slot, address };
    }

    if let Some((slot, address)) = msg.strip_prefix("ASK ").and_then(parse_redirect) {
        return Error::Ask { slot, address };
    }

    if msg.starts_with("CLUSTERDOWN") {
        return Error::ClusterDown;
    }

    if msg.starts_with("CROSSSLOT") {
        return Error::CrossSlot;
    }

    Error::Server {
        message: msg.to_string(),
    }
}

/// Parses redirect arguments: "<slot> <host>:<port>".
fn parse_redirect(args: &str) -> Option<(u16, String)> {
    let mut parts = args.split_whitespace();
    let slot: u16 = parts.next()?.parse().ok()?;
    let address = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    Some((slot, address))
}
