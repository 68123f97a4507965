//! Cloud Infrastructure Resolution
//!
//! Windows instances join the cluster with the same networking and identity
//! as the installer-created Linux workers. Resolvers answer, for one
//! cluster, which subnet, security group and IAM instance profile such a
//! worker uses. Only AWS is implemented today.

pub mod aws;

pub use aws::*;

use crate::crd::Infrastructure;
use crate::domain::ClusterClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Types
// =============================================================================

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
}

impl FromStr for CloudProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            other => Err(Error::Configuration(format!(
                "unsupported cloud provider: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudProvider::Aws => write!(f, "aws"),
        }
    }
}

/// Identity of the cluster on its cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    /// Infrastructure id, the prefix of every installer-created resource
    pub infrastructure_name: String,
    /// Cloud region, when the platform reports one
    pub region: Option<String>,
}

impl ClusterIdentity {
    /// Read the identity of the cluster `client` talks to
    pub async fn fetch(client: &dyn ClusterClient) -> Result<Self> {
        let infra = client.get_infrastructure().await?;
        Self::from_infrastructure(&infra)
    }

    /// Read the identity from the cluster Infrastructure object
    pub fn from_infrastructure(infra: &Infrastructure) -> Result<Self> {
        let status = infra.status.as_ref().ok_or_else(|| Error::CloudInfrastructure {
            provider: "unknown".into(),
            reason: "infrastructure status is not populated".into(),
        })?;
        if status.infrastructure_name.is_empty() {
            return Err(Error::CloudInfrastructure {
                provider: "unknown".into(),
                reason: "infrastructure name is empty".into(),
            });
        }
        let region = status
            .platform_status
            .as_ref()
            .and_then(|p| p.aws.as_ref())
            .map(|aws| aws.region.clone())
            .filter(|r| !r.is_empty());

        Ok(Self {
            infrastructure_name: status.infrastructure_name.clone(),
            region,
        })
    }
}

/// Worker resources resolved for one availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureResources {
    pub subnet: String,
    pub security_group: String,
    pub iam_instance_profile: String,
}

/// Extract the availability zone from a provider id such as
/// `aws:///us-east-1e/i-078285fdadccb2eaa`
pub fn zone_from_provider_id(provider_id: &str) -> Option<&str> {
    let mut segments = provider_id.rsplit('/');
    segments.next()?;
    segments.next().filter(|zone| !zone.is_empty())
}

// =============================================================================
// Resolver Port
// =============================================================================

/// Strategy for looking up worker resources on a cloud
#[async_trait]
pub trait CloudInfrastructureResolver: Send + Sync {
    /// Provider this resolver handles
    fn provider(&self) -> CloudProvider;

    /// Cluster the resolver was built for
    fn cluster(&self) -> &ClusterIdentity;

    /// Resolve the subnet, security group and IAM profile for `zone`
    async fn resolve(&self, zone: &str) -> Result<InfrastructureResources>;
}

pub type CloudInfrastructureResolverRef = Arc<dyn CloudInfrastructureResolver>;

/// Factory for creating cloud resolvers
pub struct CloudResolverFactory;

impl CloudResolverFactory {
    pub fn create(
        provider: CloudProvider,
        cluster: ClusterIdentity,
    ) -> Result<CloudInfrastructureResolverRef> {
        match provider {
            CloudProvider::Aws => Ok(Arc::new(AwsInfrastructureResolver::new(cluster)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::FakeCluster;
    use crate::crd::{AwsPlatformStatus, InfrastructureSpec, InfrastructureStatus, PlatformStatus};
    use assert_matches::assert_matches;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("aws".parse::<CloudProvider>().unwrap(), CloudProvider::Aws);
        assert_eq!("AWS".parse::<CloudProvider>().unwrap(), CloudProvider::Aws);
        assert_matches!(
            "azure".parse::<CloudProvider>(),
            Err(Error::Configuration(_))
        );
        assert_eq!(CloudProvider::Aws.to_string(), "aws");
    }

    #[test]
    fn test_zone_from_provider_id() {
        assert_eq!(
            zone_from_provider_id("aws:///us-east-1e/i-078285fdadccb2eaa"),
            Some("us-east-1e")
        );
        assert_eq!(zone_from_provider_id("i-078285fdadccb2eaa"), None);
        assert_eq!(zone_from_provider_id("aws:////i-078285fdadccb2eaa"), None);
    }

    #[test]
    fn test_cluster_identity_from_infrastructure() {
        let mut infra = Infrastructure::new("cluster", InfrastructureSpec {});
        assert_matches!(
            ClusterIdentity::from_infrastructure(&infra),
            Err(Error::CloudInfrastructure { .. })
        );

        infra.status = Some(InfrastructureStatus {
            infrastructure_name: "ci-ln-abc12-xyz".into(),
            platform_status: Some(PlatformStatus {
                type_: "AWS".into(),
                aws: Some(AwsPlatformStatus {
                    region: "us-east-1".into(),
                }),
            }),
        });
        let identity = ClusterIdentity::from_infrastructure(&infra).unwrap();
        assert_eq!(identity.infrastructure_name, "ci-ln-abc12-xyz");
        assert_eq!(identity.region.as_deref(), Some("us-east-1"));
    }

    #[tokio::test]
    async fn test_fetch_cluster_identity() {
        let cluster = FakeCluster::new();
        assert!(ClusterIdentity::fetch(&cluster).await.is_err());

        cluster.set_infrastructure(InfrastructureStatus {
            infrastructure_name: "ci-ln-abc12-xyz".into(),
            platform_status: None,
        });
        let identity = ClusterIdentity::fetch(&cluster).await.unwrap();
        assert_eq!(identity.infrastructure_name, "ci-ln-abc12-xyz");
        assert_eq!(identity.region, None);
    }

    #[tokio::test]
    async fn test_factory_creates_aws_resolver() {
        let resolver = CloudResolverFactory::create(
            CloudProvider::Aws,
            ClusterIdentity {
                infrastructure_name: "ci-ln-abc12-xyz".into(),
                region: Some("us-east-1".into()),
            },
        )
        .unwrap();
        assert_eq!(resolver.provider(), CloudProvider::Aws);
        assert_eq!(resolver.cluster().infrastructure_name, "ci-ln-abc12-xyz");
    }
}
