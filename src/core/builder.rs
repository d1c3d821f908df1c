use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{ClusterClient, ConnectionPool, ConnectionProvider, PoolConfig, SlotMap, Topology};
use crate::pipeline::PipelineOptions;
use crate::Error;

/// Builder for configuring and creating a [`ClusterClient`].
///
/// A topology is required. Without an explicit provider, a TCP
/// [`ConnectionPool`] is created from the seed nodes, or from the masters of
/// the slot map when no seeds are given.
///
/// # Example
///
/// ```
/// use slotpipe::{ClusterBuilder, SlotMap, SlotRange};
/// use std::time::Duration;
///
/// let map = SlotMap::with_ranges(vec![SlotRange::new(0, 16383, "127.0.0.1:7000")]);
/// let client = ClusterBuilder::new()
///     .slot_map(map)
///     .connection_timeout(Duration::from_secs(1))
///     .retry(5, Duration::from_millis(50))
///     .build()
///     .unwrap();
/// assert_eq!(client.options().retry_attempts, 5);
/// ```
#[derive(Default)]
pub struct ClusterBuilder {
    nodes: Option<String>,
    topology: Option<Arc<dyn Topology>>,
    fallback_seeds: Vec<String>,
    provider: Option<Arc<dyn ConnectionProvider>>,
    pool: PoolConfig,
    options: PipelineOptions,
}

impl ClusterBuilder {
    /// Creates a new [`ClusterBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed nodes.
    ///
    /// # Arguments
    ///
    /// * `nodes` - Comma-separated `host:port` or `redis://host:port` list
    #[inline]
    pub fn nodes(mut self, nodes: impl Into<String>) -> Self {
        self.nodes = Some(nodes.into());
        self
    }

    /// Routes through a custom topology.
    #[inline]
    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Routes through an in-memory slot map. Its masters double as seed nodes
    /// when none are set.
    pub fn slot_map(mut self, map: SlotMap) -> Self {
        self.fallback_seeds = map.masters();
        self.topology = Some(Arc::new(map));
        self
    }

    /// Uses a custom connection provider instead of the TCP pool.
    #[inline]
    pub fn provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Routes reads to replicas where the topology knows one.
    #[inline]
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.options.read_only = enabled;
        self
    }

    /// Dials a fresh connection for every batch.
    #[inline]
    pub fn force_dial(mut self, enabled: bool) -> Self {
        self.options.force_dial = enabled;
        self
    }

    /// Sets how many times, and how far apart, direct commands try to
    /// obtain a connection.
    #[inline]
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.options.retry_attempts = attempts;
        self.options.retry_delay = delay;
        self
    }

    /// Sets the connection timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for connection establishment
    #[inline]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool.connection_timeout = Some(timeout);
        self
    }

    /// Sets the read timeout for replies.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for a reply. `None` means no timeout.
    #[inline]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool.read_timeout = timeout;
        self
    }

    /// Sets the write timeout for batches.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for writes. `None` means no timeout.
    #[inline]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool.write_timeout = timeout;
        self
    }

    /// Sets how many idle connections the pool keeps per node.
    #[inline]
    pub fn max_idle_per_node(mut self, max: usize) -> Self {
        self.pool.max_idle_per_node = max;
        self
    }

    /// Builds the [`ClusterClient`]. No connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no topology is set, if the seed
    /// list cannot be parsed, or if neither a provider nor any seed node is
    /// available.
    pub fn build(self) -> Result<ClusterClient, Error> {
        let topology = self.topology.ok_or_else(|| Error::InvalidArgument {
            message: "topology is required".to_string(),
        })?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let seeds = match self.nodes {
                    Some(nodes) => ClusterClient::parse_addresses(&nodes)?,
                    None => self.fallback_seeds,
                };
                if seeds.is_empty() {
                    return Err(Error::InvalidArgument {
                        message: "no seed nodes provided".to_string(),
                    });
                }
                Arc::new(ConnectionPool::new(seeds, self.pool)) as Arc<dyn ConnectionProvider>
            }
        };

        Ok(ClusterClient::new(topology, provider).with_options(self.options))
    }
}
