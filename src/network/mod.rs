//! Network fabric configuration
//!
//! Everything needed to make a Windows node's hybrid overlay agree with the
//! cluster: CIDR value objects and the CNI template patcher.

pub mod cidr;
pub mod cni;

pub use cidr::*;
pub use cni::*;

/// Node annotation carrying the hybrid-overlay subnet assigned to the node
pub const HOST_SUBNET_ANNOTATION: &str = "k8s.ovn.org/hybrid-overlay-node-subnet";
