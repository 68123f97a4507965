//! AWS resolver
//!
//! The installer names worker resources after the infrastructure id:
//!
//! | Resource | Name |
//! |---|---|
//! | private subnet | `<infra>-private-<zone>` |
//! | security group | `<infra>-worker-sg` |
//! | instance profile | `<infra>-worker-profile` |
//!
//! and tags them with `kubernetes.io/cluster/<infra>=owned`.

use super::{CloudInfrastructureResolver, CloudProvider, ClusterIdentity, InfrastructureResources};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// Upper bound on AWS resource name tags
const MAX_NAME_LENGTH: usize = 255;

/// Resolves worker resources from installer naming conventions
#[derive(Debug, Clone)]
pub struct AwsInfrastructureResolver {
    cluster: ClusterIdentity,
}

impl AwsInfrastructureResolver {
    pub fn new(cluster: ClusterIdentity) -> Result<Self> {
        validate_segment("infrastructure name", &cluster.infrastructure_name)?;
        if let Some(region) = &cluster.region {
            validate_segment("region", region)?;
        }
        Ok(Self { cluster })
    }

    fn name(&self, suffix: &str) -> Result<String> {
        let name = format!("{}-{}", self.cluster.infrastructure_name, suffix);
        if name.len() > MAX_NAME_LENGTH {
            return Err(invalid(format!("resource name {} is too long", name)));
        }
        Ok(name)
    }
}

fn invalid(reason: String) -> Error {
    Error::CloudInfrastructure {
        provider: CloudProvider::Aws.to_string(),
        reason,
    }
}

/// Lowercase alphanumerics and inner dashes only
fn validate_segment(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(invalid(format!("invalid {}: {:?}", what, value)))
    }
}

#[async_trait]
impl CloudInfrastructureResolver for AwsInfrastructureResolver {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn cluster(&self) -> &ClusterIdentity {
        &self.cluster
    }

    async fn resolve(&self, zone: &str) -> Result<InfrastructureResources> {
        validate_segment("availability zone", zone)?;
        if let Some(region) = &self.cluster.region {
            if !zone.starts_with(region.as_str()) {
                return Err(invalid(format!(
                    "zone {} is outside cluster region {}",
                    zone, region
                )));
            }
        }

        let resources = InfrastructureResources {
            subnet: self.name(&format!("private-{}", zone))?,
            security_group: self.name("worker-sg")?,
            iam_instance_profile: self.name("worker-profile")?,
        };
        debug!(zone, ?resources, "Resolved AWS worker resources");
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn cluster(region: Option<&str>) -> ClusterIdentity {
        ClusterIdentity {
            infrastructure_name: "ci-ln-abc12-xyz".into(),
            region: region.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_resolve_worker_resources() {
        let resolver = AwsInfrastructureResolver::new(cluster(Some("us-east-1"))).unwrap();
        let resources = resolver.resolve("us-east-1e").await.unwrap();

        assert_eq!(resources.subnet, "ci-ln-abc12-xyz-private-us-east-1e");
        assert_eq!(resources.security_group, "ci-ln-abc12-xyz-worker-sg");
        assert_eq!(resources.iam_instance_profile, "ci-ln-abc12-xyz-worker-profile");
    }

    #[tokio::test]
    async fn test_rejects_zone_outside_region() {
        let resolver = AwsInfrastructureResolver::new(cluster(Some("us-east-1"))).unwrap();
        assert_matches!(
            resolver.resolve("eu-west-1a").await,
            Err(Error::CloudInfrastructure { .. })
        );

        let regionless = AwsInfrastructureResolver::new(cluster(None)).unwrap();
        assert!(regionless.resolve("eu-west-1a").await.is_ok());
    }

    #[tokio::test]
    async fn test_validates_identifiers() {
        for bad in ["", "-abc", "abc-", "Ci-Cluster", "abc/def"] {
            let identity = ClusterIdentity {
                infrastructure_name: bad.into(),
                region: None,
            };
            assert_matches!(
                AwsInfrastructureResolver::new(identity),
                Err(Error::CloudInfrastructure { .. }),
                "{:?} should be rejected",
                bad
            );
        }

        let resolver = AwsInfrastructureResolver::new(cluster(None)).unwrap();
        assert!(resolver.resolve("").await.is_err());
        assert!(resolver.resolve("us east").await.is_err());
    }
}
