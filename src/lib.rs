//! Windows Machine Config Operator
//!
//! Turns provisioned Windows Machines into Kubernetes worker nodes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      Machine Controller (watch)                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Bootstrap Orchestrator                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐  ┌───────────┐  │
//! │  │  User Data   │  │     CSR      │  │    Node     │  │  Network  │  │
//! │  │  Provisioner │  │  Lifecycle   │  │  Registrar  │  │  Fabric   │  │
//! │  └──────────────┘  └──────────────┘  └─────────────┘  └───────────┘  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                             Domain Ports                             │
//! │  ┌───────────────────┐  ┌──────────────────────┐  ┌───────────────┐  │
//! │  │   ClusterClient   │  │  RemoteConfigurator  │  │   KeySigner   │  │
//! │  └───────────────────┘  └──────────────────────┘  └───────────────┘  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                  Cloud Infrastructure Resolvers (AWS)                │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`bootstrap`]: orchestrator, controller and bootstrap components
//! - [`network`]: CIDR value objects and the CNI template patcher
//! - [`cloud`]: cloud resource resolution
//! - [`adapters`]: Kubernetes and command-line port implementations
//! - [`crd`]: external CRD types (Machine, Network, Infrastructure)
//! - [`domain`]: core domain types and traits
//! - [`events`]: Kubernetes Event publishing
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: error types and handling

pub mod adapters;
pub mod bootstrap;
pub mod cloud;
pub mod crd;
pub mod domain;
pub mod error;
pub mod events;
pub mod metrics;
pub mod network;

// Re-export commonly used types
pub use adapters::{ExecConfigurator, KubeClusterClient};

pub use bootstrap::{
    BootstrapConfig, BootstrapOrchestrator, CertificateLifecycleManager, Context, SshKeySigner,
    NodeRegistrar, Outcome, RetryPolicy, SkipReason, UserDataProvisioner,
};

pub use cloud::{
    AwsInfrastructureResolver, CloudInfrastructureResolver, CloudProvider, CloudResolverFactory,
    ClusterIdentity, InfrastructureResources,
};

pub use crd::{Infrastructure, Machine, Network};

pub use domain::ports::{ClusterClient, KeySigner, RemoteConfigurator, WindowsVm};

pub use error::{Error, ErrorAction, Result};

pub use events::{EventPublisher, KubeEventPublisher};

pub use metrics::Metrics;

pub use network::{CniOptions, HostSubnet, NetworkFabricConfigurator, ServiceNetwork};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
