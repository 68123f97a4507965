//! CIDR value objects
//!
//! The service network is cluster-wide and fetched once; the host subnet is
//! per node and only known after the guest has joined the overlay. Both are
//! validated on construction so the CNI patch never writes a malformed range.

use crate::domain::ClusterClient;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Validate `value` as `<ip>/<prefix>` with a prefix length that fits the
/// address family.
pub fn validate_cidr(value: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidCidr {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| invalid("missing prefix length"))?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid("invalid address"))?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid("invalid prefix length"))?;

    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid("prefix length out of range"));
    }
    Ok(())
}

// =============================================================================
// Service Network
// =============================================================================

/// Cluster service network CIDR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNetwork(String);

impl ServiceNetwork {
    /// Parse and validate a service network CIDR
    pub fn parse(cidr: &str) -> Result<Self> {
        validate_cidr(cidr)?;
        Ok(Self(cidr.to_string()))
    }

    /// Read the primary service network from the cluster Network object
    pub async fn fetch(client: &dyn ClusterClient) -> Result<Self> {
        let network = client
            .get_network()
            .await
            .map_err(|e| Error::ClusterNetwork(e.to_string()))?;
        let cidr = network.primary_service_network().ok_or_else(|| {
            Error::ClusterNetwork("cluster network object has no service network".into())
        })?;
        Self::parse(cidr)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Host Subnet
// =============================================================================

/// Per-node overlay subnet assigned by the cluster network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSubnet(String);

impl HostSubnet {
    /// Parse and validate a host subnet CIDR
    pub fn parse(cidr: &str) -> Result<Self> {
        validate_cidr(cidr)?;
        Ok(Self(cidr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostSubnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
