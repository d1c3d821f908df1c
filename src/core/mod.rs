//! Command values, single-node connections and client configuration.
//!
//! ## Modules
//!
//! - [`command`] - Command values and builders
//! - [`connection`] - Buffered RESP connection to one node
//! - [`builder`] - Cluster client builder

pub use crate::proto::error::{Error, Result};

/// Cluster client builder.
pub mod builder;
/// Command construction helpers.
pub mod command;
/// Low-level connection management.
pub mod connection;
