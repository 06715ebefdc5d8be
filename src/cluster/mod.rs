//! Cluster-wide orchestration over a set of node sessions.
//!
//! A [`ClusterProxy`] owns one [`NodeProxy`] per node in a
//! [`ClusterDefinition`], designates the alphabetically first manager as
//! the coordination point, and hands out shared secret store and key-value
//! clients that are built on first use.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::command_line::CommandArg;
use crate::config::NodeConfig;
use crate::kv::ConsulClient;
use crate::node::NodeProxy;
use crate::response::CommandResponse;
use crate::run_options::RunOptions;
use crate::secrets::{DEFAULT_REQUEST_TIMEOUT, VaultClient};
use crate::transport::{ProcessTransport, SshTransport};

mod definition;
mod error;

pub use definition::{ClusterDefinition, ClusterSecrets, NodeDefinition, NodeRole};
pub use error::ClusterError;

/// Session type owned by a cluster.
pub type ClusterNode<T> = NodeProxy<NodeDefinition, T>;

/// A pending upload of one file to one node, produced by
/// [`ClusterProxy::upload_step`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigStep {
    /// Target node name.
    pub node: String,
    /// Remote destination path.
    pub remote_path: String,
    /// File contents.
    pub text: String,
}

impl ConfigStep {
    /// Uploads the file to its node as root.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownNode`] when the node is not part of
    /// `cluster`, or the node's upload error.
    pub fn apply<T: SshTransport + 'static>(&self, cluster: &ClusterProxy<T>) -> Result<(), ClusterError> {
        let node = cluster.node(&self.node)?;
        node.upload_text(&self.remote_path, &self.text, 0, true)?;
        Ok(())
    }
}

/// Orchestrates the nodes of one cluster.
pub struct ClusterProxy<T: SshTransport = ProcessTransport> {
    definition: ClusterDefinition,
    secrets: ClusterSecrets,
    nodes: Vec<Arc<ClusterNode<T>>>,
    manager: Arc<ClusterNode<T>>,
    request_timeout: Duration,
    vault: Mutex<Option<Arc<VaultClient>>>,
    consul: Mutex<Option<Arc<ConsulClient>>>,
}

impl ClusterProxy<ProcessTransport> {
    /// Resolves every node and opens sessions through the system `ssh` and
    /// `scp` clients.
    ///
    /// # Errors
    ///
    /// Same as [`ClusterProxy::build`].
    pub async fn connect(
        definition: ClusterDefinition,
        secrets: ClusterSecrets,
        config: &NodeConfig,
    ) -> Result<Self, ClusterError> {
        Self::build(definition, secrets, |node, address| {
            NodeProxy::from_config(node.name.clone(), address.to_string(), node.clone(), config)
        })
        .await
    }
}

impl<T: SshTransport + 'static> ClusterProxy<T> {
    /// Validates `definition`, resolves each node's address, and builds
    /// one session per node with `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Definition`] for an invalid definition or
    /// when any node's address does not resolve to exactly one IP; no
    /// partially built cluster is returned.
    pub async fn build<F>(
        definition: ClusterDefinition,
        secrets: ClusterSecrets,
        mut factory: F,
    ) -> Result<Self, ClusterError>
    where
        F: FnMut(&NodeDefinition, IpAddr) -> ClusterNode<T>,
    {
        definition.validate()?;

        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let address = resolve_address(node).await?;
            debug!(node = %node.name, %address, "resolved node address");
            nodes.push(Arc::new(factory(node, address)));
        }

        let manager_name = definition
            .manager_name()
            .ok_or_else(|| ClusterError::Definition(String::from("no manager node")))?;
        let manager = nodes
            .iter()
            .find(|node| node.name() == manager_name)
            .map(Arc::clone)
            .ok_or_else(|| ClusterError::UnknownNode(manager_name.to_owned()))?;
        info!(
            cluster = %definition.name,
            nodes = nodes.len(),
            manager = %manager.name(),
            "cluster ready"
        );

        Ok(Self {
            definition,
            secrets,
            nodes,
            manager,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            vault: Mutex::new(None),
            consul: Mutex::new(None),
        })
    }

    /// Sets the timeout used by the shared HTTP clients.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Definition the cluster was built from.
    #[must_use]
    pub const fn definition(&self) -> &ClusterDefinition {
        &self.definition
    }

    /// Cluster credentials.
    #[must_use]
    pub const fn secrets(&self) -> &ClusterSecrets {
        &self.secrets
    }

    /// Sessions in definition order.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<ClusterNode<T>>] {
        &self.nodes
    }

    /// The coordinating manager session.
    #[must_use]
    pub fn manager(&self) -> &ClusterNode<T> {
        &self.manager
    }

    /// Looks a session up by node name.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownNode`] when no node has that name.
    pub fn node(&self, name: &str) -> Result<&ClusterNode<T>, ClusterError> {
        self.nodes
            .iter()
            .find(|node| node.name() == name)
            .map(Arc::as_ref)
            .ok_or_else(|| ClusterError::UnknownNode(name.to_owned()))
    }

    /// One upload of `text` to `remote_path` per node.
    #[must_use]
    pub fn upload_step(&self, remote_path: &str, text: &str) -> Vec<ConfigStep> {
        self.nodes
            .iter()
            .map(|node| ConfigStep {
                node: node.name().to_owned(),
                remote_path: remote_path.to_owned(),
                text: text.to_owned(),
            })
            .collect()
    }

    /// Runs `operation` against every node concurrently on blocking worker
    /// threads and returns `(node name, result)` pairs in node order.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Task`] when a worker panics or is cancelled.
    pub async fn run_on_all<F, R>(&self, operation: F) -> Result<Vec<(String, R)>, ClusterError>
    where
        F: Fn(&ClusterNode<T>) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let shared_operation = Arc::new(operation);
        let handles: Vec<_> = self
            .nodes
            .iter()
            .map(|node| {
                let session = Arc::clone(node);
                let task = Arc::clone(&shared_operation);
                let handle = tokio::task::spawn_blocking(move || (*task)(&session));
                (node.name().to_owned(), handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(value) => results.push((name, value)),
                Err(err) => {
                    return Err(ClusterError::Task {
                        node: name,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(results)
    }

    /// Runs the `vault` CLI under sudo on the manager with the root token
    /// exported. The invocation is classified so the token never reaches
    /// the logs.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::MissingSecret`] without a root token, or the
    /// manager's execution error.
    pub fn vault_command(&self, args: &[CommandArg]) -> Result<CommandResponse, ClusterError> {
        let token = self
            .secrets
            .vault_root_token
            .as_deref()
            .ok_or(ClusterError::MissingSecret("vault_root_token"))?;
        let mut command = format!("export VAULT_TOKEN={token}");
        if let Some(url) = self.definition.vault_url.as_deref() {
            command = format!("{command} && export VAULT_ADDR={url}");
        }
        command = format!("{command} && vault");
        Ok(self
            .manager
            .sudo_command(&command, args, RunOptions::CLASSIFIED)?)
    }

    /// Shared secret store client, authenticated on first use.
    ///
    /// AppRole credentials take precedence over the root token.
    /// Concurrent first calls build a single client.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::MissingEndpoint`] without a vault URL,
    /// [`ClusterError::MissingSecret`] without credentials, or the login
    /// failure.
    pub async fn vault(&self) -> Result<Arc<VaultClient>, ClusterError> {
        let mut slot = self.vault.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let url = self
            .definition
            .vault_url
            .as_deref()
            .ok_or(ClusterError::MissingEndpoint("vault_url"))?;
        let client = VaultClient::new(url, self.request_timeout)?;
        let authenticated = match (&self.secrets.vault_app_role, &self.secrets.vault_root_token) {
            (Some(credentials), _) => {
                client.login_with_app_role(credentials).await?;
                client
            }
            (None, Some(token)) => client.with_token(token.clone()),
            (None, None) => return Err(ClusterError::MissingSecret("vault credentials")),
        };

        let shared = Arc::new(authenticated);
        *slot = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Shared key-value client, built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::MissingEndpoint`] without a consul URL or
    /// the client construction failure.
    pub async fn consul(&self) -> Result<Arc<ConsulClient>, ClusterError> {
        let mut slot = self.consul.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let url = self
            .definition
            .consul_url
            .as_deref()
            .ok_or(ClusterError::MissingEndpoint("consul_url"))?;
        let mut client = ConsulClient::new(url, self.request_timeout)?;
        if let Some(token) = &self.secrets.consul_token {
            client = client.with_token(token.clone());
        }

        let shared = Arc::new(client);
        *slot = Some(Arc::clone(&shared));
        Ok(shared)
    }
}

async fn resolve_address(node: &NodeDefinition) -> Result<IpAddr, ClusterError> {
    if let Ok(address) = node.address.parse::<IpAddr>() {
        return Ok(address);
    }
    let resolved = tokio::net::lookup_host((node.address.as_str(), 0))
        .await
        .map_err(|err| {
            ClusterError::Definition(format!(
                "node {}: cannot resolve {}: {err}",
                node.name, node.address
            ))
        })?;
    single_address(node, resolved.map(|socket| socket.ip()))
}

/// Requires exactly one distinct address.
pub(crate) fn single_address(
    node: &NodeDefinition,
    addresses: impl IntoIterator<Item = IpAddr>,
) -> Result<IpAddr, ClusterError> {
    let distinct: BTreeSet<IpAddr> = addresses.into_iter().collect();
    let mut iter = distinct.iter();
    match (iter.next(), iter.next()) {
        (Some(address), None) => Ok(*address),
        (None, _) => Err(ClusterError::Definition(format!(
            "node {}: {} resolved to no address",
            node.name, node.address
        ))),
        (Some(_), Some(_)) => Err(ClusterError::Definition(format!(
            "node {}: {} resolved to {} addresses",
            node.name,
            node.address,
            distinct.len()
        ))),
    }
}
