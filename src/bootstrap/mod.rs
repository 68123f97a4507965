//! Windows node bootstrap
//!
//! - [`orchestrator`]: per-Machine reconciliation sequence
//! - [`controller`]: watch wiring for the orchestrator
//! - [`csr`]: kubelet CSR discovery and approval
//! - [`node`]: Node correlation, worker label and host subnet
//! - [`userdata`]: first-boot user-data secret
//! - [`retry`]: polling and conflict retry policies

pub mod config;
pub mod controller;
pub mod csr;
pub mod node;
pub mod orchestrator;
pub mod retry;
pub mod userdata;

pub use config::BootstrapConfig;
pub use controller::Context;
pub use csr::{CertificateLifecycleManager, BOOTSTRAPPER_REQUESTOR, NODE_REQUESTOR};
pub use node::{NodeRegistrar, WINDOWS_NODE_SELECTOR, WORKER_LABEL};
pub use orchestrator::{assess, BootstrapOrchestrator, Outcome, SkipReason};
pub use retry::{ConflictRetry, RetryPolicy};
pub use userdata::{SshKeySigner, UserDataProvisioner};
