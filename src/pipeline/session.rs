use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::batch::Batch;
use super::command::PipelineCommand;
use super::PipelineOptions;
use crate::cluster::pool::{BoxConnection, ConnectionProvider};
use crate::cluster::redirect::parse_redis_error;
use crate::cluster::topology::Topology;
use crate::core::command::Cmd;
use crate::proto::frame::Frame;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum Pass {
    Initial,
    Redirect,
}

/// A single-use queue of commands executed across cluster nodes.
///
/// Commands are queued with [`send`](Pipeline::send), executed together by
/// [`flush`](Pipeline::flush) and read back one by one with
/// [`receive`](Pipeline::receive) in the order they were queued, whatever
/// node served them. Each command is executed at most twice per flush: once
/// at the node the topology names and once more if that node redirects it.
///
/// The pipeline holds at most one connection per node between passes and
/// returns all of them on [`close`](Pipeline::close). Dropping an unclosed
/// pipeline drops its connections instead of returning them.
pub struct Pipeline {
    topology: Arc<dyn Topology>,
    provider: Arc<dyn ConnectionProvider>,
    options: PipelineOptions,
    commands: Vec<PipelineCommand>,
    connections: HashMap<String, BoxConnection>,
    direct: Option<BoxConnection>,
    flushed: bool,
    cursor: usize,
}

impl Pipeline {
    /// Creates an empty pipeline. No connection is made until it is flushed.
    pub fn new(
        topology: Arc<dyn Topology>,
        provider: Arc<dyn ConnectionProvider>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            topology,
            provider,
            options,
            commands: Vec::new(),
            connections: HashMap::new(),
            direct: None,
            flushed: false,
            cursor: 0,
        }
    }

    /// Queues a command. Nothing is written until [`flush`](Pipeline::flush).
    pub fn send(&mut self, cmd: Cmd) {
        self.commands.push(PipelineCommand::new(cmd));
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns true once a flush has completed.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub(crate) fn topology(&self) -> &dyn Topology {
        self.topology.as_ref()
    }

    /// Executes every queued command.
    ///
    /// Per-command failures (server errors, unreachable nodes, unresolved
    /// slots) are recorded on the command and surface from
    /// [`receive`](Pipeline::receive); only a routing failure that affects the
    /// whole pipeline is returned here. Flushing again is a no-op.
    #[instrument(level = "debug", skip(self), fields(commands = self.commands.len()))]
    pub async fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        if !self.commands.is_empty() {
            self.route().await?;

            self.run_pass(Pass::Initial).await;
            self.report_redirects(1);

            if self.run_pass(Pass::Redirect).await > 0 {
                self.report_redirects(2);
            }
        }
        self.flushed = true;
        Ok(())
    }

    /// Returns the reply of the next command in send order.
    ///
    /// Fails with [`Error::NotFlushed`] before a flush and with
    /// [`Error::NoMoreReplies`] once every reply has been read.
    pub fn receive(&mut self) -> Result<Frame> {
        if !self.flushed {
            return Err(Error::NotFlushed);
        }
        let command = self
            .commands
            .get_mut(self.cursor)
            .ok_or(Error::NoMoreReplies)?;
        self.cursor += 1;
        command.take_reply()
    }

    /// Returns every held connection to its provider.
    ///
    /// All connections are released even if some fail to close; the first
    /// failure is returned. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let mut held: Vec<BoxConnection> = self.connections.drain().map(|(_, c)| c).collect();
        held.extend(self.direct.take());

        let mut first_error = None;
        for mut conn in held {
            if let Err(e) = conn.close().await {
                warn!(address = conn.address(), error = %e, "failed to release connection");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs one command immediately on a connection to any node, bypassing
    /// the queue and slot routing.
    ///
    /// The connection is obtained with the configured retry policy and kept
    /// for later calls until it fails or the pipeline is closed.
    pub async fn execute(&mut self, cmd: Cmd) -> Result<Frame> {
        let mut conn = match self.direct.take() {
            Some(conn) => conn,
            None => {
                self.provider
                    .connect_with_retry(self.options.retry_attempts, self.options.retry_delay)
                    .await?
            }
        };

        let reply: Result<Frame> = async {
            conn.send(&cmd).await?;
            conn.flush().await?;
            conn.receive().await
        }
        .await;

        match reply {
            Ok(frame) => {
                self.direct = Some(conn);
                match frame {
                    Frame::Error(msg) => Err(parse_redis_error(&msg)),
                    frame => Ok(frame),
                }
            }
            Err(e) => {
                warn!(address = conn.address(), error = %e, "direct command failed");
                if let Err(close) = conn.close().await {
                    debug!(address = conn.address(), error = %close, "close after failure");
                }
                Err(e)
            }
        }
    }

    /// Computes slots and resolves every command's node in one lookup.
    async fn route(&mut self) -> Result<()> {
        let topology = &self.topology;
        let slots: Vec<Option<u16>> = self
            .commands
            .iter_mut()
            .map(|command| {
                let slot = topology.slot_of(command.cmd());
                command.set_slot(slot);
                slot
            })
            .collect();

        let addresses = self
            .topology
            .resolve_addresses(&slots, self.options.read_only)
            .await?;
        if addresses.len() != self.commands.len() {
            return Err(Error::RoutingMismatch {
                expected: self.commands.len(),
                actual: addresses.len(),
            });
        }

        for (command, address) in self.commands.iter_mut().zip(addresses) {
            command.route(address);
        }
        Ok(())
    }

    /// Runs one batch per node concurrently and returns how many commands
    /// were executed.
    async fn run_pass(&mut self, pass: Pass) -> usize {
        let mut batches: BTreeMap<String, Batch<'_>> = BTreeMap::new();
        for command in self.commands.iter_mut() {
            let address = match pass {
                Pass::Initial => command.initial_target().map(str::to_string),
                Pass::Redirect if command.attempts() == 1 => command.redirect_target(),
                Pass::Redirect => None,
            };
            let Some(address) = address else {
                continue;
            };
            batches
                .entry(address.clone())
                .or_insert_with(|| {
                    let reused = self.connections.remove(&address);
                    Batch::new(address, reused)
                })
                .push(command);
        }

        let executed: usize = batches.values().map(Batch::len).sum();
        if executed == 0 {
            return 0;
        }
        debug!(?pass, nodes = batches.len(), commands = executed, "running pipeline pass");

        let provider = self.provider.as_ref();
        let options = &self.options;
        let finished = join_all(
            batches
                .into_values()
                .map(|batch| batch.run(provider, options)),
        )
        .await;

        for (address, conn) in finished {
            if let Some(conn) = conn {
                self.connections.insert(address, conn);
            }
        }
        executed
    }

    /// Tells the topology about MOVED replies from the given attempt.
    fn report_redirects(&self, attempt: u8) {
        for command in &self.commands {
            if command.attempts() != attempt {
                continue;
            }
            if let Some(redirect) = command.redirect() {
                debug!(%redirect, attempt, "command redirected");
                if redirect.is_moved() {
                    self.topology.mark_stale(redirect);
                }
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("commands", &self.commands.len())
            .field("connections", &self.connections.len())
            .field("flushed", &self.flushed)
            .field("cursor", &self.cursor)
            .finish()
    }
}
