//! Redirect-aware pipelining over a hash-slot cluster.
//!
//! A [`Pipeline`] queues commands without I/O, then on
//! [`flush`](Pipeline::flush) routes each one by slot, runs one pipelined
//! batch per node concurrently and retries MOVED/ASK replies once at the
//! node named by the redirect. Replies are read back with
//! [`receive`](Pipeline::receive) in the order the commands were sent.
//!
//! ```no_run
//! # async fn example(client: slotpipe::ClusterClient) -> slotpipe::Result<()> {
//! use slotpipe::command;
//!
//! let mut pipeline = client.pipeline();
//! pipeline.send(command::set("user:1", "alice"));
//! pipeline.send(command::get("user:2"));
//! pipeline.flush().await?;
//! let set_reply = pipeline.receive()?;
//! let get_reply = pipeline.receive()?;
//! pipeline.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

mod batch;
mod command;
pub(crate) mod multi;
mod session;

pub use session::Pipeline;

/// Per-pipeline execution flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Route reads to replicas when the topology knows one.
    pub read_only: bool,
    /// Always dial fresh connections instead of reusing idle ones.
    pub force_dial: bool,
    /// Attempts made by [`Pipeline::execute`] to obtain its connection.
    pub retry_attempts: u32,
    /// Delay between those attempts.
    pub retry_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            force_dial: false,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}
