//! Bootstrap configuration

use super::retry::RetryPolicy;
use crate::crd::MACHINE_API_NAMESPACE;
use crate::network::DEFAULT_CNI_CONFIG_PATH;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the [`BootstrapOrchestrator`](super::BootstrapOrchestrator)
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Namespace holding Windows Machines and the user-data secret
    pub namespace: String,

    /// Polling budget for the kubelet CSRs
    pub csr_retry: RetryPolicy,

    /// Polling budget for the node's host subnet annotation
    pub host_subnet_retry: RetryPolicy,

    /// CNI template patched for each node
    pub cni_config_path: PathBuf,

    /// Patch and push the CNI config once the node has joined
    pub configure_network: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            namespace: MACHINE_API_NAMESPACE.to_string(),
            csr_retry: RetryPolicy::default(),
            host_subnet_retry: RetryPolicy::new(60, Duration::from_secs(5)),
            cni_config_path: PathBuf::from(DEFAULT_CNI_CONFIG_PATH),
            configure_network: true,
        }
    }
}
