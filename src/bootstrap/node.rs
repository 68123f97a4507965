//! Node Registrar
//!
//! Correlates a cloud instance with the Node its kubelet registered and
//! marks that Node as a worker.

use super::retry::{ConflictRetry, RetryPolicy};
use crate::crd::instance_id_from_provider_id;
use crate::domain::ClusterClientRef;
use crate::error::{Error, Result};
use crate::network::{HostSubnet, HOST_SUBNET_ANNOTATION};
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Selector matching every Windows node
pub const WINDOWS_NODE_SELECTOR: &str = "node.openshift.io/os_id=Windows";

/// Role label marking a node as a worker
pub const WORKER_LABEL: &str = "node-role.kubernetes.io/worker";

fn node_name(node: &Node) -> Result<&str> {
    node.metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::Internal("Node has no name".into()))
}

/// Whether the node was registered for `instance_id`
pub fn matches_instance(node: &Node, instance_id: &str) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .map_or(false, |provider_id| {
            instance_id_from_provider_id(provider_id) == instance_id
        })
}

pub struct NodeRegistrar {
    client: ClusterClientRef,
    conflict_retry: ConflictRetry,
}

impl NodeRegistrar {
    pub fn new(client: ClusterClientRef) -> Self {
        Self {
            client,
            conflict_retry: ConflictRetry::default(),
        }
    }

    pub fn with_conflict_retry(mut self, conflict_retry: ConflictRetry) -> Self {
        self.conflict_retry = conflict_retry;
        self
    }

    /// Find the Windows node whose provider id ends in `instance_id`
    pub async fn find_node(&self, instance_id: &str) -> Result<Node> {
        let nodes = self.client.list_nodes(WINDOWS_NODE_SELECTOR).await?;
        debug!(count = nodes.len(), instance_id, "Listed Windows nodes");

        nodes
            .into_iter()
            .find(|node| matches_instance(node, instance_id))
            .ok_or_else(|| Error::NodeNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    /// Set the worker role label and replace the node.
    ///
    /// The label is applied to a fresh copy on every attempt, so writes
    /// racing with the kubelet or the overlay are retried. Nodes that
    /// already carry the label are replaced anyway.
    pub async fn apply_worker_label(&self, node: Node) -> Result<Node> {
        let name = node_name(&node)?.to_string();
        let client = self.client.clone();

        let updated = self
            .conflict_retry
            .run("apply worker label", || {
                let client = client.clone();
                let name = name.clone();
                async move {
                    let mut current = client.get_node(&name).await?.ok_or_else(|| {
                        Error::Internal(format!("node {} no longer exists", name))
                    })?;
                    current
                        .metadata
                        .labels
                        .get_or_insert_with(BTreeMap::new)
                        .insert(WORKER_LABEL.to_string(), String::new());
                    Ok::<_, Error>(client.replace_node(&current).await?)
                }
            })
            .await
            .map_err(|source| Error::NodeUpdate {
                node: name.clone(),
                source: Box::new(source),
            })?;
        info!(node = %name, "Worker label applied");
        Ok(updated)
    }

    /// Wait for the overlay to publish the node's host subnet
    pub async fn wait_for_host_subnet(
        &self,
        node_name: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<HostSubnet> {
        let client = self.client.clone();
        let annotation = policy
            .poll(cancel, "wait for host subnet", || {
                let client = client.clone();
                async move {
                    let node = client.get_node(node_name).await?;
                    Ok::<_, Error>(node
                        .and_then(|n| n.metadata.annotations)
                        .and_then(|mut a| a.remove(HOST_SUBNET_ANNOTATION))
                        .filter(|subnet| !subnet.is_empty()))
                }
            })
            .await?;

        match annotation {
            Some(subnet) => HostSubnet::parse(&subnet),
            None => {
                warn!(node = node_name, "Host subnet annotation never appeared");
                Err(Error::HostSubnetUnavailable {
                    node: node_name.to_string(),
                })
            }
        }
    }
}
