//! Custom Resource Definitions consumed by the operator
//!
//! This module contains the external CRD types the operator reads:
//! - Machine: machine-api instance lifecycle objects
//! - Network / Infrastructure: cluster-wide configuration singletons

pub mod machine;
pub mod cluster_config;

pub use machine::*;
pub use cluster_config::*;
