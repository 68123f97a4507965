//! Domain Ports - Core trait definitions for the bootstrap operator
//!
//! These traits define the boundaries between the bootstrap logic and
//! external systems: the cluster control plane, the Windows guest, and the
//! SSH key material. Adapters implement these traits to provide concrete
//! functionality.

use crate::crd::{Infrastructure, Machine, Network};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{Node, Secret};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Windows VM
// =============================================================================

/// A provisioned Windows instance that is ready to be configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsVm {
    /// Name of the Machine object backing the instance
    pub machine_name: String,
    /// Cloud instance identifier (final segment of the provider id)
    pub instance_id: String,
    /// Internal IP address used to reach the guest
    pub ip_address: String,
}

impl std::fmt::Display for WindowsVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.machine_name, self.instance_id, self.ip_address)
    }
}

// =============================================================================
// Cluster Client Port
// =============================================================================

/// Port for the cluster objects the bootstrap flow reads and mutates
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a Machine, `None` if it no longer exists
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>>;

    /// Get a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create a Secret. An existing object surfaces as an API 409.
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()>;

    /// List every CertificateSigningRequest in the cluster
    async fn list_csrs(&self) -> Result<Vec<CertificateSigningRequest>>;

    /// Get a single CertificateSigningRequest by name
    async fn get_csr(&self, name: &str) -> Result<CertificateSigningRequest>;

    /// Replace the approval subresource of a CSR (resourceVersion checked)
    async fn update_csr_approval(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest>;

    /// List Nodes matching a label selector
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>>;

    /// Get a Node by name, `None` if it does not exist
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;

    /// Replace a Node object
    async fn replace_node(&self, node: &Node) -> Result<Node>;

    /// Get the cluster Network configuration singleton
    async fn get_network(&self) -> Result<Network>;

    /// Get the cluster Infrastructure singleton
    async fn get_infrastructure(&self) -> Result<Infrastructure>;
}

// =============================================================================
// Remote Configurator Port
// =============================================================================

/// Port for configuring the Windows guest OS over a remote session
#[async_trait]
pub trait RemoteConfigurator: Send + Sync {
    /// Install and start the node components (kubelet, hybrid overlay, ...)
    async fn configure(&self, vm: &WindowsVm) -> Result<()>;

    /// Transfer the patched CNI configuration and configure the node network
    async fn configure_network(&self, vm: &WindowsVm, cni_config: &Path) -> Result<()>;
}

// =============================================================================
// Key Signer Port
// =============================================================================

/// Private key used to reach Windows guests over SSH
pub trait KeySigner: Send + Sync {
    /// Public half in OpenSSH `authorized_keys` format, if derivable
    fn authorized_key(&self) -> Option<String>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterClientRef = Arc<dyn ClusterClient>;
pub type RemoteConfiguratorRef = Arc<dyn RemoteConfigurator>;
pub type KeySignerRef = Arc<dyn KeySigner>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_vm_display() {
        let vm = WindowsVm {
            machine_name: "winworker-abc".into(),
            instance_id: "i-078285fdadccb2eaa".into(),
            ip_address: "10.0.1.1".into(),
        };
        assert_eq!(
            format!("{}", vm),
            "winworker-abc (i-078285fdadccb2eaa, 10.0.1.1)"
        );
    }
}
