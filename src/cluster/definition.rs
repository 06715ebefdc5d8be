//! Cluster definition and secrets documents.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::ClusterError;
use crate::secrets::AppRoleCredentials;

/// Role a node plays in the swarm.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Coordinates the cluster.
    Manager,
    /// Runs workloads only.
    Worker,
}

/// One node in a cluster definition.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeDefinition {
    /// Unique node name.
    pub name: String,
    /// IP address or host name used to reach the node.
    pub address: String,
    /// Node role.
    pub role: NodeRole,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodeDefinition {
    /// Whether the node is a manager.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.role == NodeRole::Manager
    }
}

/// Description of a whole cluster.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterDefinition {
    /// Cluster name.
    pub name: String,
    /// Datacenter label.
    #[serde(default)]
    pub datacenter: String,
    /// Member nodes, in definition order.
    pub nodes: Vec<NodeDefinition>,
    /// Base URL of the secret store.
    #[serde(default)]
    pub vault_url: Option<String>,
    /// Base URL of the key-value directory.
    #[serde(default)]
    pub consul_url: Option<String>,
}

impl ClusterDefinition {
    /// Parses and validates a JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Definition`] for malformed JSON or an
    /// invalid definition.
    pub fn from_json(json: &str) -> Result<Self, ClusterError> {
        let definition: Self = serde_json::from_str(json)
            .map_err(|err| ClusterError::Definition(format!("cannot parse definition: {err}")))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Checks that the cluster is named, has uniquely named nodes, and has
    /// at least one manager.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Definition`] describing the first problem.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.name.trim().is_empty() {
            return Err(ClusterError::Definition(String::from("cluster name is empty")));
        }
        if self.nodes.is_empty() {
            return Err(ClusterError::Definition(format!(
                "cluster {} defines no nodes",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() || node.address.trim().is_empty() {
                return Err(ClusterError::Definition(String::from(
                    "every node needs a name and an address",
                )));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(ClusterError::Definition(format!(
                    "node {} is defined more than once",
                    node.name
                )));
            }
        }
        if !self.nodes.iter().any(NodeDefinition::is_manager) {
            return Err(ClusterError::Definition(format!(
                "cluster {} has no manager node",
                self.name
            )));
        }
        Ok(())
    }

    /// Name of the coordinating node: the alphabetically first manager.
    #[must_use]
    pub fn manager_name(&self) -> Option<&str> {
        self.nodes
            .iter()
            .filter(|node| node.is_manager())
            .map(|node| node.name.as_str())
            .min()
    }
}

/// Credentials associated with a cluster.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ClusterSecrets {
    /// Root token for the secret store.
    #[serde(default)]
    pub vault_root_token: Option<String>,
    /// AppRole credentials used by the shared secret store client.
    #[serde(default)]
    pub vault_app_role: Option<AppRoleCredentials>,
    /// ACL token for the key-value directory.
    #[serde(default)]
    pub consul_token: Option<String>,
}

impl std::fmt::Debug for ClusterSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |value: Option<&String>| value.map(|_| "<redacted>");
        f.debug_struct("ClusterSecrets")
            .field("vault_root_token", &mask(self.vault_root_token.as_ref()))
            .field("vault_app_role", &self.vault_app_role)
            .field("consul_token", &mask(self.consul_token.as_ref()))
            .finish()
    }
}
