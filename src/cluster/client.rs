//! Entry point tying a topology and a connection provider together.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use super::pool::ConnectionProvider;
use super::topology::Topology;
use crate::core::builder::ClusterBuilder;
use crate::pipeline::{multi, Pipeline, PipelineOptions};
use crate::proto::frame::Frame;
use crate::{Error, Result};

/// Cluster client handing out pipelines.
///
/// Cloning is cheap; clones share the topology and connection provider, so
/// slot updates learned by one pipeline are seen by all.
#[derive(Clone)]
pub struct ClusterClient {
    topology: Arc<dyn Topology>,
    provider: Arc<dyn ConnectionProvider>,
    options: PipelineOptions,
}

impl ClusterClient {
    /// Creates a client with default pipeline options.
    pub fn new(topology: Arc<dyn Topology>, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            topology,
            provider,
            options: PipelineOptions::default(),
        }
    }

    /// Returns a builder for configuring a client.
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::new()
    }

    /// Replaces the options applied to every new pipeline.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Options applied to every new pipeline.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The shared topology.
    pub fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    /// Starts a new pipeline.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.topology),
            Arc::clone(&self.provider),
            self.options.clone(),
        )
    }

    /// Reads several keys that may live on different nodes.
    ///
    /// Values come back in the order of `keys`; a key whose slot could not be
    /// read comes back as [`Frame::Null`].
    pub async fn mget(&self, keys: &[Bytes]) -> Result<Vec<Frame>> {
        multi::mget(self.pipeline(), keys).await
    }

    /// Sets several key/value pairs (`k1, v1, k2, v2, ...`) that may live on
    /// different nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentCount`] for an odd number of arguments, or the
    /// first error returned by any node.
    pub async fn mset(&self, args: &[Bytes]) -> Result<Frame> {
        multi::mset(self.pipeline(), args).await
    }

    /// Parses a comma-separated list of node addresses into `host:port` form.
    pub(crate) fn parse_addresses(addresses: &str) -> Result<Vec<String>> {
        let mut parsed = Vec::new();
        for addr in addresses.split(',') {
            let addr = addr.trim();
            if addr.is_empty() {
                continue;
            }
            parsed.push(addr.strip_prefix("redis://").unwrap_or(addr).to_string());
        }

        if parsed.is_empty() {
            return Err(Error::InvalidArgument {
                message: "no valid addresses provided".to_string(),
            });
        }

        Ok(parsed)
    }
}

impl fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
