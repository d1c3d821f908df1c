//! # slotpipe
//!
//! Pipelined command execution over a hash-slot partitioned key/value
//! cluster speaking RESP.
//!
//! Commands queued on a [`Pipeline`] are grouped by the node owning their
//! slot, written to every node concurrently in one batch per node and read
//! back in the order they were queued. MOVED and ASK redirects are followed
//! once. [`ClusterClient::mget`] and [`ClusterClient::mset`] split multi-key
//! commands by slot on top of the same machinery.
//!
//! ## Example
//!
//! ```no_run
//! use slotpipe::{command, ClusterClient, SlotMap, SlotRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let map = SlotMap::with_ranges(vec![SlotRange::new(0, 16383, "127.0.0.1:7000")]);
//!     let client = ClusterClient::builder().slot_map(map).build()?;
//!
//!     let mut pipeline = client.pipeline();
//!     pipeline.send(command::set("greeting", "hello"));
//!     pipeline.send(command::get("greeting"));
//!     pipeline.flush().await?;
//!     let _ok = pipeline.receive()?;
//!     let _value = pipeline.receive()?;
//!     pipeline.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub(crate) mod core;
pub mod cluster;
pub mod pipeline;
pub mod proto;

#[cfg(test)]
mod stress;

pub use crate::cluster::{
    key_slot, BoxConnection, ClusterClient, ConnectionPool, ConnectionProvider, NodeConnection,
    PoolConfig, Redirect, RedirectKind, SlotMap, SlotRange, Topology,
};
pub use crate::core::builder::ClusterBuilder;
pub use crate::core::command::{self, Cmd};
pub use crate::core::connection::Connection;
pub use crate::core::{Error, Result};
pub use crate::pipeline::{Pipeline, PipelineOptions};
pub use crate::proto::frame::Frame;
