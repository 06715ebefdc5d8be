//! Core library for the Neon node command layer.
//!
//! The crate drives remote cluster nodes over SSH: a [`NodeProxy`] runs
//! plain and sudo commands, deploys [`CommandBundle`] archives, and moves
//! files, while a [`ClusterProxy`] fans operations out across a whole
//! cluster and shares secret store and key-value clients between them.

pub mod bundle;
pub mod clock;
pub mod cluster;
pub mod command_line;
pub mod config;
pub mod kv;
pub mod layout;
pub mod node;
pub mod response;
pub mod run_options;
pub mod secrets;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;
pub mod text;
pub mod transport;

pub use bundle::{BundleContents, BundleError, BundleFile, CommandBundle};
pub use clock::{Clock, SystemClock};
pub use cluster::{
    ClusterDefinition, ClusterError, ClusterProxy, ClusterSecrets, ConfigStep, NodeDefinition,
    NodeRole,
};
pub use command_line::CommandArg;
pub use config::{ConfigError, NodeConfig};
pub use kv::{ConsulClient, KeyValueError, KeyValueStore};
pub use node::{ConnectionState, NodeError, NodeProxy};
pub use response::CommandResponse;
pub use run_options::RunOptions;
pub use secrets::{AppRoleCredentials, SecretStore, SecretStoreError, VaultClient};
pub use transport::{Channel, ProcessTransport, RemoteOutput, SshTransport, TransportError};
