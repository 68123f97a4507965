//! Cluster configuration CRDs
//!
//! Cluster-scoped `config.openshift.io/v1` singletons (always named
//! `cluster`) that describe the service network and the cloud platform the
//! cluster runs on.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the cluster-wide configuration singletons
pub const CLUSTER_CONFIG_NAME: &str = "cluster";

// =============================================================================
// Network
// =============================================================================

/// Cluster network configuration
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Network",
    plural = "networks"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// CIDRs used for service IPs; the first entry is the primary range
    #[serde(default)]
    pub service_network: Vec<String>,

    /// Plugin providing the pod network (OVNKubernetes, OpenShiftSDN, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

// =============================================================================
// Infrastructure
// =============================================================================

/// Cluster infrastructure description
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    plural = "infrastructures",
    status = "InfrastructureStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {}

/// Observed infrastructure details
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// Unique infrastructure id, used as a prefix on cloud resource names
    #[serde(default)]
    pub infrastructure_name: String,

    /// Platform specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_status: Option<PlatformStatus>,
}

/// Cloud platform the cluster was installed on
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    /// Platform type (AWS, Azure, ...)
    #[serde(rename = "type", default)]
    pub type_: String,

    /// AWS specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatformStatus>,
}

/// AWS platform details
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsPlatformStatus {
    /// Region the cluster runs in
    #[serde(default)]
    pub region: String,
}

impl Network {
    /// The primary service network CIDR, if configured
    pub fn primary_service_network(&self) -> Option<&str> {
        self.spec
            .service_network
            .first()
            .map(String::as_str)
            .filter(|cidr| !cidr.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_service_network() {
        let network = Network::new(
            CLUSTER_CONFIG_NAME,
            NetworkSpec {
                service_network: vec!["172.30.0.0/16".into(), "fd02::/112".into()],
                network_type: Some("OVNKubernetes".into()),
            },
        );
        assert_eq!(network.primary_service_network(), Some("172.30.0.0/16"));

        let empty = Network::new(CLUSTER_CONFIG_NAME, NetworkSpec::default());
        assert_eq!(empty.primary_service_network(), None);
    }

    #[test]
    fn test_decode_infrastructure_status() {
        let raw = serde_json::json!({
            "apiVersion": "config.openshift.io/v1",
            "kind": "Infrastructure",
            "metadata": {"name": "cluster"},
            "spec": {"cloudConfig": {"name": ""}},
            "status": {
                "infrastructureName": "ci-ln-abc12-xyz",
                "platformStatus": {"type": "AWS", "aws": {"region": "us-east-1"}}
            }
        });
        let infra: Infrastructure = serde_json::from_value(raw).unwrap();
        let status = infra.status.unwrap();
        assert_eq!(status.infrastructure_name, "ci-ln-abc12-xyz");
        let platform = status.platform_status.unwrap();
        assert_eq!(platform.type_, "AWS");
        assert_eq!(platform.aws.unwrap().region, "us-east-1");
    }
}
