//! Splitting multi-key commands by slot.
//!
//! MGET and MSET may only touch keys of one slot. These helpers group the
//! caller's keys by slot, send one command per group through a pipeline and
//! put the answers back together.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tracing::warn;

use super::Pipeline;
use crate::core::command;
use crate::proto::frame::Frame;
use crate::{Error, Result};

/// Sets every key/value pair in `args` (`k1, v1, k2, v2, ...`).
///
/// Returns the reply of the last per-slot MSET, or the first error any of
/// them produced. The pipeline is always closed.
pub(crate) async fn mset(mut pipeline: Pipeline, args: &[Bytes]) -> Result<Frame> {
    if args.is_empty() {
        return Ok(Frame::Null);
    }
    if args.len() % 2 != 0 {
        return Err(Error::ArgumentCount {
            command: "MSET",
            count: args.len(),
        });
    }

    let mut groups: BTreeMap<u16, Vec<(Bytes, Bytes)>> = BTreeMap::new();
    for pair in args.chunks_exact(2) {
        let slot = pipeline.topology().key_slot(&pair[0]);
        groups
            .entry(slot)
            .or_default()
            .push((pair[0].clone(), pair[1].clone()));
    }
    let sent = groups.len();
    for pairs in groups.into_values() {
        pipeline.send(command::mset(pairs));
    }

    let outcome = last_reply(&mut pipeline, sent).await;
    let closed = pipeline.close().await;
    let reply = outcome?;
    closed?;
    Ok(reply)
}

async fn last_reply(pipeline: &mut Pipeline, count: usize) -> Result<Frame> {
    pipeline.flush().await?;
    let mut last = Frame::Null;
    for _ in 0..count {
        last = pipeline.receive()?;
    }
    Ok(last)
}

/// Reads every key in `keys`, returning one value per key in the same order.
///
/// A slot whose reply is an error or does not carry one value per key reads
/// as [`Frame::Null`] for each of its keys. The pipeline is always closed.
pub(crate) async fn mget(mut pipeline: Pipeline, keys: &[Bytes]) -> Result<Vec<Frame>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups: BTreeMap<u16, Vec<Bytes>> = BTreeMap::new();
    for key in keys {
        let slot = pipeline.topology().key_slot(key);
        groups.entry(slot).or_default().push(key.clone());
    }
    let groups: Vec<(u16, Vec<Bytes>)> = groups.into_iter().collect();
    for (_, group) in &groups {
        pipeline.send(command::mget(group.iter().cloned()));
    }

    let outcome = gather(&mut pipeline, &groups).await;
    let closed = pipeline.close().await;
    let values = outcome?;
    closed?;

    Ok(keys
        .iter()
        .map(|key| values.get(key).cloned().unwrap_or(Frame::Null))
        .collect())
}

async fn gather(
    pipeline: &mut Pipeline,
    groups: &[(u16, Vec<Bytes>)],
) -> Result<HashMap<Bytes, Frame>> {
    pipeline.flush().await?;

    let mut values = HashMap::new();
    for (slot, group) in groups {
        let items = match pipeline.receive() {
            Ok(reply) => match reply.clone().into_array() {
                Some(items) if items.len() == group.len() => Some(items),
                _ => {
                    warn!(slot, keys = group.len(), reply = ?reply, "unexpected MGET reply");
                    None
                }
            },
            Err(e) => {
                warn!(slot, keys = group.len(), error = %e, "MGET failed for slot");
                None
            }
        };
        match items {
            Some(items) => {
                for (key, value) in group.iter().zip(items) {
                    values.insert(key.clone(), value);
                }
            }
            None => {
                for key in group {
                    values.insert(key.clone(), Frame::Null);
                }
            }
        }
    }
    Ok(values)
}
