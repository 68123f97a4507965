//! CNI Configuration Patching
//!
//! The hybrid-overlay CNI template shipped with the operator has placeholder
//! fields that must match the cluster before it is copied to a Windows node:
//!
//! - `ipam.subnet` becomes the node's host subnet
//! - the `OutBoundNAT` policy's first `ExceptionList` entry becomes the
//!   service network, so service traffic is not NATed
//! - the `ROUTE` policy's `DestinationPrefix` becomes the service network
//!
//! Policies are located by their `value.Type`; a template missing either
//! one is rejected before anything is written.

use crate::error::{Error, Result};
use crate::network::cidr::{HostSubnet, ServiceNetwork};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the CNI template inside the operator image
pub const DEFAULT_CNI_CONFIG_PATH: &str = "/payload/cni/cni-conf-template.json";

/// Policy type carrying the NAT exception list
pub const OUTBOUND_NAT_POLICY: &str = "OutBoundNAT";

/// Policy type carrying the service route
pub const ROUTE_POLICY: &str = "ROUTE";

// =============================================================================
// CNI Document Schema
// =============================================================================

/// CNI configuration document.
///
/// Input keys are accepted in both `camelCase` and the capitalised form
/// older templates were written with. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniConfig {
    #[serde(default, alias = "CniVersion")]
    pub cni_version: String,

    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(rename = "type", default, alias = "Type")]
    pub type_: String,

    #[serde(default, alias = "Capabilities")]
    pub capabilities: Capabilities,

    #[serde(default, alias = "Ipam")]
    pub ipam: Ipam,

    #[serde(default, alias = "Policies")]
    pub policies: Vec<Policy>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, alias = "Dns")]
    pub dns: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// IP address management section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(rename = "type", default, alias = "Type")]
    pub type_: String,

    #[serde(default, alias = "Subnet")]
    pub subnet: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named endpoint policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Value")]
    pub value: PolicyValue,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of an endpoint policy. Field names follow the HNS wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyValue {
    #[serde(rename = "Type", default)]
    pub type_: String,

    #[serde(rename = "ExceptionList", default, skip_serializing_if = "Option::is_none")]
    pub exception_list: Option<Vec<String>>,

    #[serde(rename = "DestinationPrefix", default, skip_serializing_if = "Option::is_none")]
    pub destination_prefix: Option<String>,

    #[serde(rename = "NeedEncap", default, skip_serializing_if = "Option::is_none")]
    pub need_encap: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CniConfig {
    /// First policy whose `value.Type` equals `policy_type`
    pub fn policy_mut(&mut self, policy_type: &str) -> Option<&mut PolicyValue> {
        self.policies
            .iter_mut()
            .map(|p| &mut p.value)
            .find(|v| v.type_ == policy_type)
    }
}

// =============================================================================
// CNI Options
// =============================================================================

/// Values substituted into the CNI template for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CniOptions {
    pub service_network: ServiceNetwork,
    pub host_subnet: HostSubnet,
}

impl CniOptions {
    pub fn new(service_network: ServiceNetwork, host_subnet: HostSubnet) -> Self {
        Self {
            service_network,
            host_subnet,
        }
    }
}

/// Apply `options` to a decoded document.
///
/// Both policies are resolved before the first mutation, so on error the
/// document is left untouched.
pub fn apply(config: &mut CniConfig, options: &CniOptions, path: &Path) -> Result<()> {
    let missing = |policy_type: &str| Error::CniPolicyMissing {
        path: path.display().to_string(),
        policy_type: policy_type.to_string(),
    };

    let nat_ok = config
        .policies
        .iter()
        .find(|p| p.value.type_ == OUTBOUND_NAT_POLICY)
        .and_then(|p| p.value.exception_list.as_ref())
        .map_or(false, |list| !list.is_empty());
    if !nat_ok {
        return Err(missing(OUTBOUND_NAT_POLICY));
    }
    if config.policy_mut(ROUTE_POLICY).is_none() {
        return Err(missing(ROUTE_POLICY));
    }

    let service = options.service_network.as_str().to_string();
    config.ipam.subnet = options.host_subnet.as_str().to_string();

    if let Some(list) = config
        .policy_mut(OUTBOUND_NAT_POLICY)
        .and_then(|v| v.exception_list.as_mut())
    {
        list[0] = service.clone();
    }
    if let Some(route) = config.policy_mut(ROUTE_POLICY) {
        route.destination_prefix = Some(service);
    }
    Ok(())
}

// =============================================================================
// Network Fabric Configurator
// =============================================================================

/// Patches the CNI template file in place
#[derive(Debug, Clone)]
pub struct NetworkFabricConfigurator {
    template_path: PathBuf,
}

impl Default for NetworkFabricConfigurator {
    fn default() -> Self {
        Self::new(DEFAULT_CNI_CONFIG_PATH)
    }
}

impl NetworkFabricConfigurator {
    pub fn new(template_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
        }
    }

    /// Location of the template this configurator patches
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Read, patch and write back the CNI template.
    ///
    /// The write is a plain overwrite; a single operator process owns the
    /// file.
    pub async fn patch(&self, options: &CniOptions) -> Result<()> {
        let path = self.template_path.display().to_string();

        let raw = tokio::fs::read(&self.template_path)
            .await
            .map_err(|source| Error::CniRead {
                path: path.clone(),
                source,
            })?;

        let mut config: CniConfig =
            serde_json::from_slice(&raw).map_err(|source| Error::CniDecode {
                path: path.clone(),
                source,
            })?;

        apply(&mut config, options, &self.template_path)?;

        let encoded = serde_json::to_vec_pretty(&config).map_err(|source| Error::CniEncode {
            path: path.clone(),
            source,
        })?;

        tokio::fs::write(&self.template_path, encoded)
            .await
            .map_err(|source| Error::CniWrite {
                path: path.clone(),
                source,
            })?;

        debug!(
            path = %path,
            host_subnet = %options.host_subnet,
            service_network = %options.service_network,
            "Patched CNI config"
        );
        info!("CNI config {} populated for host subnet {}", path, options.host_subnet);
        Ok(())
    }
}
