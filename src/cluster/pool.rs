//! Connection provisioning for cluster nodes.
//!
//! Pipelines never dial on their own: they ask a [`ConnectionProvider`] for a
//! [`NodeConnection`] per address and hand it back through
//! [`NodeConnection::close`]. [`ConnectionPool`] is the TCP implementation,
//! keeping idle connections per node for reuse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::commands::readonly;
use super::redirect::parse_redis_error;
use crate::core::command::Cmd;
use crate::core::connection::Connection;
use crate::proto::frame::Frame;
use crate::{Error, Result};

/// A connection to one node, used with a pipelined write-then-read discipline.
///
/// `send` may buffer; nothing is guaranteed to reach the node before `flush`.
/// `receive` returns replies in send order. Server error replies are returned
/// as [`Frame::Error`]; an `Err` means the connection itself failed.
#[async_trait]
pub trait NodeConnection: Send {
    /// The address this connection is bound to.
    fn address(&self) -> &str;

    /// Queues a command.
    async fn send(&mut self, cmd: &Cmd) -> Result<()>;

    /// Writes every queued command.
    async fn flush(&mut self) -> Result<()>;

    /// Reads the next reply.
    async fn receive(&mut self) -> Result<Frame>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Boxed connection handed out by providers.
pub type BoxConnection = Box<dyn NodeConnection>;

/// Source of node connections consumed by pipelines.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Returns a connection to `address`.
    ///
    /// With `force_dial` the provider must not reuse an idle connection.
    /// With `read_only` the connection may serve reads from a replica.
    async fn connection_for(
        &self,
        address: &str,
        force_dial: bool,
        read_only: bool,
    ) -> Result<BoxConnection>;

    /// Returns a connection to any reachable node, trying up to
    /// `max_attempts` times with `delay` between attempts.
    async fn connect_with_retry(&self, max_attempts: u32, delay: Duration)
        -> Result<BoxConnection>;
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of idle connections kept per node
    pub max_idle_per_node: usize,
    /// Maximum time to establish a TCP connection
    pub connection_timeout: Option<Duration>,
    /// Maximum time to wait for one reply
    pub read_timeout: Option<Duration>,
    /// Maximum time to write one batch
    pub write_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_node: 10,
            connection_timeout: Some(Duration::from_secs(5)),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

type IdleKey = (String, bool);
type IdleMap = HashMap<IdleKey, Vec<Connection<TcpStream>>>;

#[derive(Debug, Default)]
struct IdleConnections {
    inner: Mutex<IdleMap>,
}

impl IdleConnections {
    fn lock(&self) -> MutexGuard<'_, IdleMap> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take(&self, key: &IdleKey) -> Option<Connection<TcpStream>> {
        self.lock().get_mut(key).and_then(Vec::pop)
    }

    fn put(&self, key: IdleKey, conn: Connection<TcpStream>, max_idle: usize) -> bool {
        let mut idle = self.lock();
        let conns = idle.entry(key).or_default();
        if conns.len() >= max_idle {
            return false;
        }
        conns.push(conn);
        true
    }

    fn count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}

/// TCP connection pool for cluster nodes.
///
/// Connections are owned exclusively by whoever acquired them and return to
/// the idle list on [`NodeConnection::close`] unless they saw a transport
/// error or still have unread replies.
#[derive(Debug)]
pub struct ConnectionPool {
    config: PoolConfig,
    seeds: Vec<String>,
    next_seed: AtomicUsize,
    idle: Arc<IdleConnections>,
}

impl ConnectionPool {
    /// Creates a pool. `seeds` are the nodes tried by
    /// [`connect_with_retry`](ConnectionProvider::connect_with_retry).
    pub fn new(seeds: Vec<String>, config: PoolConfig) -> Self {
        Self {
            config,
            seeds,
            next_seed: AtomicUsize::new(0),
            idle: Arc::new(IdleConnections::default()),
        }
    }

    /// Returns the number of idle connections across all nodes.
    pub fn idle_count(&self) -> usize {
        self.idle.count()
    }

    async fn dial(&self, address: &str, read_only: bool) -> Result<Connection<TcpStream>> {
        let target = dial_address(address)?;
        let connect = TcpStream::connect(target.as_str());
        let stream = match self.config.connection_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::Timeout {
                    operation: "connect",
                    elapsed_ms: limit.as_millis() as u64,
                })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;

        let mut conn = Connection::new(stream)
            .with_timeouts(self.config.read_timeout, self.config.write_timeout);
        if read_only {
            if let Frame::Error(msg) = conn.request(&readonly()).await? {
                return Err(parse_redis_error(&msg));
            }
        }
        debug!(address, read_only, "dialed node");
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionPool {
    async fn connection_for(
        &self,
        address: &str,
        force_dial: bool,
        read_only: bool,
    ) -> Result<BoxConnection> {
        let key = (address.to_string(), read_only);
        let reused = if force_dial {
            None
        } else {
            self.idle.take(&key)
        };
        let conn = match reused {
            Some(conn) => conn,
            None => self.dial(address, read_only).await?,
        };
        Ok(Box::new(PooledConnection {
            key,
            inner: Some(conn),
            pending: 0,
            broken: false,
            idle: Arc::clone(&self.idle),
            max_idle: self.config.max_idle_per_node,
        }))
    }

    async fn connect_with_retry(
        &self,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<BoxConnection> {
        if self.seeds.is_empty() {
            return Err(Error::InvalidArgument {
                message: "no seed nodes configured".to_string(),
            });
        }
        let mut last_error = None;
        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            let index = self.next_seed.fetch_add(1, Ordering::Relaxed) % self.seeds.len();
            let seed = &self.seeds[index];
            match self.connection_for(seed, false, false).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(address = %seed, attempt, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Protocol {
            message: "no connection attempt made".to_string(),
        }))
    }
}

/// A pool-owned TCP connection lent to one user at a time.
struct PooledConnection {
    key: IdleKey,
    inner: Option<Connection<TcpStream>>,
    pending: usize,
    broken: bool,
    idle: Arc<IdleConnections>,
    max_idle: usize,
}

impl PooledConnection {
    fn conn(&mut self) -> Result<&mut Connection<TcpStream>> {
        match self.inner.as_mut() {
            Some(conn) if !self.broken => Ok(conn),
            _ => Err(Error::Connection {
                address: self.key.0.clone(),
                message: "connection is closed".to_string(),
            }),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.broken = true;
        }
        result
    }
}

#[async_trait]
impl NodeConnection for PooledConnection {
    fn address(&self) -> &str {
        &self.key.0
    }

    async fn send(&mut self, cmd: &Cmd) -> Result<()> {
        self.conn()?.send(cmd);
        self.pending += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let result = self.conn()?.flush().await;
        self.track(result)
    }

    async fn receive(&mut self) -> Result<Frame> {
        let result = self.conn()?.read_frame().await;
        let frame = self.track(result)?;
        self.pending = self.pending.saturating_sub(1);
        Ok(frame)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.inner.take() else {
            return Ok(());
        };
        if self.broken || self.pending > 0 {
            debug!(address = %self.key.0, "dropping unusable connection");
            let _ = conn.shutdown().await;
            return Ok(());
        }
        if !self.idle.put(self.key.clone(), conn, self.max_idle) {
            debug!(address = %self.key.0, "idle list full, dropping connection");
        }
        Ok(())
    }
}

/// Converts `redis://host:port` or `host:port` into a dialable `host:port`.
fn dial_address(address: &str) -> Result<String> {
    if !address.contains("://") {
        return Ok(address.to_string());
    }
    let parsed = url::Url::parse(address).map_err(|_| Error::InvalidArgument {
        message: format!("invalid node address: {}", address),
    })?;
    if parsed.scheme() != "redis" {
        return Err(Error::InvalidArgument {
            message: format!("unsupported scheme in {}, expected redis://", address),
        });
    }
    let host = parsed.host_str().ok_or_else(|| Error::InvalidArgument {
        message: format!("missing host in {}", address),
    })?;
    Ok(format!("{}:{}", host, parsed.port().unwrap_or(6379)))
}
