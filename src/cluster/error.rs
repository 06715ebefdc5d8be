//! Errors raised by cluster orchestration.

use thiserror::Error;

use crate::kv::KeyValueError;
use crate::node::NodeError;
use crate::secrets::SecretStoreError;

/// Errors surfaced by [`super::ClusterProxy`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The cluster definition is unusable, including nodes whose address
    /// does not resolve to exactly one IP.
    #[error("invalid cluster definition: {0}")]
    Definition(String),
    /// No node with the requested name exists.
    #[error("cluster has no node named {0}")]
    UnknownNode(String),
    /// A required credential is missing from the cluster secrets.
    #[error("cluster secrets lack {0}")]
    MissingSecret(&'static str),
    /// A shared client needs a URL the definition does not provide.
    #[error("cluster definition lacks {0}")]
    MissingEndpoint(&'static str),
    /// A node operation failed.
    #[error(transparent)]
    Node(#[from] NodeError),
    /// The shared secret store client failed.
    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),
    /// The shared key-value client failed.
    #[error(transparent)]
    KeyValue(#[from] KeyValueError),
    /// A fan-out task panicked or was cancelled.
    #[error("fan-out task for node {node} failed: {message}")]
    Task {
        /// Node whose task failed.
        node: String,
        /// Join error description.
        message: String,
    },
}
