//! Slot ownership as seen by the client.
//!
//! [`Topology`] is the seam the pipeline routes through. [`SlotMap`] is the
//! default, in-memory implementation: the caller assigns slot ranges to nodes
//! and MOVED redirects patch individual slots in place until the next full
//! assignment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use super::redirect::Redirect;
use super::slot::{self, SLOT_COUNT};
use crate::core::command::Cmd;
use crate::{Error, Result};

/// Routing collaborator consumed by pipelines.
///
/// One instance is shared (behind an `Arc`) by every pipeline created from a
/// client, so redirects observed by any pipeline are visible to all of them.
#[async_trait]
pub trait Topology: Send + Sync {
    /// Resolves every slot to a node address, in input order.
    ///
    /// `None` in the input means the command has no key and may go to any
    /// node. `None` in the output means no node is known for that slot. The
    /// returned vector must have the same length as `slots`.
    async fn resolve_addresses(
        &self,
        slots: &[Option<u16>],
        prefer_replica: bool,
    ) -> Result<Vec<Option<String>>>;

    /// Hashes a key to its slot.
    fn key_slot(&self, key: &[u8]) -> u16 {
        slot::key_slot(key)
    }

    /// Computes the slot of a command from its key argument.
    fn slot_of(&self, cmd: &Cmd) -> Option<u16> {
        slot::command_key(cmd).map(|key| self.key_slot(key))
    }

    /// Signals that the mapping behind `redirect` is out of date.
    ///
    /// Must not block and may be called from several tasks at once.
    fn mark_stale(&self, redirect: &Redirect);
}

/// A range of hash slots served by one master and its replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// Start of the slot range (inclusive)
    pub start: u16,
    /// End of the slot range (inclusive)
    pub end: u16,
    /// Address of the master serving this range
    pub master: String,
    /// Addresses of replicas for this range
    pub replicas: Vec<String>,
}

impl SlotRange {
    /// Creates a range served by `master` alone.
    pub fn new(start: u16, end: u16, master: impl Into<String>) -> Self {
        Self {
            start,
            end,
            master: master.into(),
            replicas: Vec::new(),
        }
    }

    /// Adds a replica address.
    pub fn with_replica(mut self, replica: impl Into<String>) -> Self {
        self.replicas.push(replica.into());
        self
    }

    /// Returns true if the given slot is within this range.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Returns the number of slots in this range.
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Returns true if this range is empty (invalid).
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    fn address_for(&self, slot: u16, prefer_replica: bool) -> &str {
        if prefer_replica && !self.replicas.is_empty() {
            &self.replicas[slot as usize % self.replicas.len()]
        } else {
            &self.master
        }
    }
}

#[derive(Debug, Default)]
struct SlotTable {
    ranges: Vec<SlotRange>,
    /// Slots reassigned by MOVED since the last full assignment.
    moved: HashMap<u16, String>,
}

impl SlotTable {
    fn resolve(&self, slot: Option<u16>, prefer_replica: bool) -> Option<String> {
        match slot {
            Some(slot) => {
                if let Some(address) = self.moved.get(&slot) {
                    return Some(address.clone());
                }
                self.ranges
                    .iter()
                    .find(|range| range.contains(slot))
                    .map(|range| range.address_for(slot, prefer_replica).to_string())
            }
            None => self.ranges.first().map(|range| range.master.clone()),
        }
    }
}

/// In-memory slot table implementing [`Topology`].
///
/// # Example
///
/// ```
/// use slotpipe::{SlotMap, SlotRange};
///
/// let map = SlotMap::new();
/// map.assign(vec![
///     SlotRange::new(0, 8191, "127.0.0.1:7000"),
///     SlotRange::new(8192, 16383, "127.0.0.1:7001"),
/// ]);
/// assert!(map.is_fully_covered());
/// ```
#[derive(Debug, Default)]
pub struct SlotMap {
    table: RwLock<SlotTable>,
    needs_refresh: AtomicBool,
}

impl SlotMap {
    /// Creates an empty slot map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot map with the given ranges.
    pub fn with_ranges(ranges: Vec<SlotRange>) -> Self {
        let map = Self::new();
        map.assign(ranges);
        map
    }

    /// Replaces every range, discarding slots patched by redirects.
    pub fn assign(&self, ranges: Vec<SlotRange>) {
        let mut table = self.write();
        table.ranges = ranges;
        table.ranges.sort_by_key(|range| range.start);
        table.moved.clear();
        self.needs_refresh.store(false, Ordering::Release);
    }

    /// Returns true once a MOVED redirect has been observed since the last
    /// [`assign`](SlotMap::assign).
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh.load(Ordering::Acquire)
    }

    /// Returns the current owner of `slot`, if known.
    pub fn master_for_slot(&self, slot: u16) -> Option<String> {
        self.read().resolve(Some(slot), false)
    }

    /// Returns every distinct master address, in range order.
    pub fn masters(&self) -> Vec<String> {
        let table = self.read();
        let mut masters: Vec<String> = Vec::new();
        for range in &table.ranges {
            if !masters.contains(&range.master) {
                masters.push(range.master.clone());
            }
        }
        masters
    }

    /// Checks if the ranges cover all slots (0-16383).
    pub fn is_fully_covered(&self) -> bool {
        let table = self.read();
        let mut covered = vec![false; SLOT_COUNT as usize];
        for range in &table.ranges {
            for slot in range.start..=range.end.min(SLOT_COUNT - 1) {
                covered[slot as usize] = true;
            }
        }
        covered.iter().all(|&c| c)
    }

    fn read(&self) -> RwLockReadGuard<'_, SlotTable> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Topology for SlotMap {
    async fn resolve_addresses(
        &self,
        slots: &[Option<u16>],
        prefer_replica: bool,
    ) -> Result<Vec<Option<String>>> {
        let table = self.read();
        if table.ranges.is_empty() && table.moved.is_empty() {
            return Err(Error::ClusterDown);
        }
        Ok(slots
            .iter()
            .map(|slot| table.resolve(*slot, prefer_replica))
            .collect())
    }

    fn mark_stale(&self, redirect: &Redirect) {
        if !redirect.is_moved() {
            return;
        }
        debug!(%redirect, "slot owner changed");
        self.write()
            .moved
            .insert(redirect.slot, redirect.address.clone());
        self.needs_refresh.store(true, Ordering::Release);
    }
}
