//! Cluster-side collaborators of the pipeline.
//!
//! ## Features
//!
//! - **Slot hashing**: CRC16 key slots with `{...}` hash tags
//! - **Routing**: the [`Topology`] trait and the in-memory [`SlotMap`]
//! - **Redirects**: typed MOVED/ASK parsing
//! - **Connection pooling**: the [`ConnectionProvider`] trait and the TCP [`ConnectionPool`]
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> slotpipe::Result<()> {
//! use slotpipe::{ClusterClient, SlotMap, SlotRange};
//! use bytes::Bytes;
//!
//! let map = SlotMap::with_ranges(vec![
//!     SlotRange::new(0, 8191, "127.0.0.1:7000"),
//!     SlotRange::new(8192, 16383, "127.0.0.1:7001"),
//! ]);
//! let client = ClusterClient::builder().slot_map(map).build()?;
//!
//! client
//!     .mset(&[Bytes::from("a"), Bytes::from("1"), Bytes::from("b"), Bytes::from("2")])
//!     .await?;
//! let values = client.mget(&[Bytes::from("a"), Bytes::from("b")]).await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod commands;
pub mod pool;
pub mod redirect;
pub mod slot;
pub mod topology;

pub use client::ClusterClient;
pub use pool::{BoxConnection, ConnectionPool, ConnectionProvider, NodeConnection, PoolConfig};
pub use redirect::{Redirect, RedirectKind};
pub use slot::key_slot;
pub use topology::{SlotMap, SlotRange, Topology};
