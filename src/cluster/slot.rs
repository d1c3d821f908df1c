//! Hash slot calculation.
//!
//! Keys map to one of 16384 slots through CRC16/XMODEM. If a key contains a
//! non-empty `{...}` section, only that section is hashed (hash tags), which
//! lets callers force related keys into one slot.

use crc::{Crc, CRC_16_XMODEM};

use crate::core::command::Cmd;

/// Number of hash slots in the cluster.
pub const SLOT_COUNT: u16 = 16384;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Commands that never carry a key and may be sent to any node.
const KEYLESS_COMMANDS: &[&str] = &[
    "ASKING",
    "AUTH",
    "CLIENT",
    "CLUSTER",
    "COMMAND",
    "CONFIG",
    "DBSIZE",
    "ECHO",
    "FLUSHALL",
    "FLUSHDB",
    "INFO",
    "PING",
    "READONLY",
    "READWRITE",
    "SCRIPT",
    "SELECT",
    "TIME",
];

/// Calculates the slot for a key.
///
/// # Examples
///
/// ```
/// use slotpipe::key_slot;
///
/// assert_eq!(key_slot(b"foo"), 12182);
/// assert_eq!(key_slot(b"{user1000}.following"), key_slot(b"{user1000}.followers"));
/// ```
pub fn key_slot(key: &[u8]) -> u16 {
    CRC16.checksum(hash_tag(key)) % SLOT_COUNT
}

/// Returns the slot a command routes to, or `None` for keyless commands.
///
/// The key is the first argument, except for `EVAL`/`EVALSHA` where it is the
/// first key after `numkeys` (a script with no keys has no slot).
pub fn command_slot(cmd: &Cmd) -> Option<u16> {
    command_key(cmd).map(key_slot)
}

/// Returns the argument that decides where a command is routed.
pub fn command_key(cmd: &Cmd) -> Option<&[u8]> {
    if KEYLESS_COMMANDS.iter().any(|name| cmd.is(name)) {
        return None;
    }
    let args = cmd.args();
    if cmd.is("EVAL") || cmd.is("EVALSHA") {
        let numkeys = std::str::from_utf8(args.get(1)?).ok()?.parse::<usize>().ok()?;
        if numkeys == 0 {
            return None;
        }
        return args.get(2).map(|k| &k[..]);
    }
    args.first().map(|k| &k[..])
}

/// Extracts the part of a key that is hashed.
///
/// - `{user1000}.following` → `user1000`
/// - `foo{bar}{baz}` → `bar` (first pair only)
/// - `foo{}bar` → whole key (empty tag)
/// - `foo{bar` → whole key (unterminated)
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[start + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[start + 1..start + 1 + len];
            }
        }
    }
    key
}
