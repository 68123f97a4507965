//! Adapters implementing the domain ports
//!
//! - [`cluster`]: cluster access through the Kubernetes API
//! - [`exec`]: remote configuration through an external bootstrapper

pub mod cluster;
pub mod exec;

#[cfg(test)]
pub mod fake;

pub use cluster::KubeClusterClient;
pub use exec::ExecConfigurator;
