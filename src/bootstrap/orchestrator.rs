//! Bootstrap Orchestrator
//!
//! Reconciliation entry point for Windows Machines. Each call re-reads the
//! Machine and walks the bootstrap sequence from the top:
//!
//! ```text
//! user-data secret ─► Machine lookup ─► eligibility
//!        ─► remote configuration ─► CSR approval ─► worker label
//!        ─► host subnet ─► CNI patch ─► network configuration ─► event
//! ```
//!
//! No state is carried between calls; the sequence is idempotent.

use super::config::BootstrapConfig;
use super::csr::CertificateLifecycleManager;
use super::node::NodeRegistrar;
use super::userdata::UserDataProvisioner;
use crate::cloud::{zone_from_provider_id, CloudInfrastructureResolverRef};
use crate::crd::{instance_id_from_provider_id, Machine, PROVISIONED_PHASE};
use crate::domain::{ClusterClientRef, KeySignerRef, RemoteConfiguratorRef, WindowsVm};
use crate::error::{Error, Result};
use crate::events::{actions, reasons, EventPublisherRef};
use crate::metrics::{outcomes, stages, Metrics};
use crate::network::{CniOptions, NetworkFabricConfigurator, ServiceNetwork};
use kube::runtime::events::EventType;
use kube::Resource;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// =============================================================================
// Outcome
// =============================================================================

/// Why a Machine was not bootstrapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Phase unset or not yet `Provisioned`
    NotProvisioned(Option<String>),
    /// No addresses reported at all
    NoAddresses,
    /// Addresses reported but none of type `InternalIP`
    NoInternalIp,
    /// Provider id missing or empty
    NoProviderId,
    /// Provider id ends in `/`
    NoInstanceId,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotProvisioned(Some(phase)) => write!(f, "phase is {}", phase),
            SkipReason::NotProvisioned(None) => write!(f, "phase is not set"),
            SkipReason::NoAddresses => write!(f, "no addresses"),
            SkipReason::NoInternalIp => write!(f, "no internal IP address"),
            SkipReason::NoProviderId => write!(f, "no provider id"),
            SkipReason::NoInstanceId => write!(f, "provider id has no instance id"),
        }
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Machine is not (yet) eligible; nothing was changed
    Skipped(SkipReason),
    /// Machine no longer exists
    NotFound,
    /// Machine joined the cluster as `node`
    Configured { node: String },
}

impl Outcome {
    fn metric_label(&self) -> &'static str {
        match self {
            Outcome::Skipped(_) => outcomes::SKIPPED,
            Outcome::NotFound => outcomes::NOT_FOUND,
            Outcome::Configured { .. } => outcomes::CONFIGURED,
        }
    }
}

/// Decide whether `machine` can be bootstrapped. Pure; reads only.
pub fn assess(machine: &Machine) -> std::result::Result<WindowsVm, SkipReason> {
    match machine.phase() {
        Some(PROVISIONED_PHASE) => {}
        other => return Err(SkipReason::NotProvisioned(other.map(String::from))),
    }

    let has_addresses = machine
        .status
        .as_ref()
        .map_or(false, |s| !s.addresses.is_empty());
    if !has_addresses {
        return Err(SkipReason::NoAddresses);
    }
    let ip_address = machine.internal_ip().ok_or(SkipReason::NoInternalIp)?;

    let provider_id = machine.provider_id().ok_or(SkipReason::NoProviderId)?;
    let instance_id = instance_id_from_provider_id(provider_id);
    if instance_id.is_empty() {
        return Err(SkipReason::NoInstanceId);
    }

    Ok(WindowsVm {
        machine_name: machine.metadata.name.clone().unwrap_or_default(),
        instance_id: instance_id.to_string(),
        ip_address: ip_address.to_string(),
    })
}

/// Failure stage reported on metrics
fn failure_stage(error: &Error) -> &'static str {
    match error {
        Error::RemoteConfiguration { .. } => stages::REMOTE_CONFIGURATION,
        Error::CsrNotFound { .. } | Error::CsrApproval { .. } => stages::CSR,
        Error::NodeNotFound { .. } | Error::NodeUpdate { .. } => stages::NODE,
        Error::HostSubnetUnavailable { .. }
        | Error::InvalidCidr { .. }
        | Error::CniRead { .. }
        | Error::CniDecode { .. }
        | Error::CniEncode { .. }
        | Error::CniWrite { .. }
        | Error::CniPolicyMissing { .. } => stages::NETWORK,
        _ => stages::MACHINE,
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Sequences the bootstrap components for one Machine at a time
pub struct BootstrapOrchestrator {
    config: BootstrapConfig,
    client: ClusterClientRef,
    configurator: RemoteConfiguratorRef,
    events: EventPublisherRef,
    signer: Option<KeySignerRef>,
    cloud: Option<CloudInfrastructureResolverRef>,
    service_network: ServiceNetwork,
    metrics: Metrics,
    cancel: CancellationToken,

    user_data: UserDataProvisioner,
    csrs: CertificateLifecycleManager,
    nodes: NodeRegistrar,
    network: NetworkFabricConfigurator,
    /// Serializes use of the shared CNI template between patch and upload
    network_lock: Mutex<()>,
}

impl BootstrapOrchestrator {
    pub fn new(
        config: BootstrapConfig,
        client: ClusterClientRef,
        configurator: RemoteConfiguratorRef,
        events: EventPublisherRef,
        service_network: ServiceNetwork,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        let user_data = UserDataProvisioner::new(client.clone(), config.namespace.clone());
        let csrs = CertificateLifecycleManager::new(client.clone(), config.csr_retry, cancel.clone())
            .with_metrics(metrics.clone());
        let nodes = NodeRegistrar::new(client.clone());
        let network = NetworkFabricConfigurator::new(config.cni_config_path.clone());

        Self {
            config,
            client,
            configurator,
            events,
            signer: None,
            cloud: None,
            service_network,
            metrics,
            cancel,
            user_data,
            csrs,
            nodes,
            network,
            network_lock: Mutex::new(()),
        }
    }

    pub fn with_signer(mut self, signer: KeySignerRef) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_cloud_resolver(mut self, resolver: CloudInfrastructureResolverRef) -> Self {
        self.cloud = Some(resolver);
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Reconcile the Machine `namespace/name`
    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        info!("Reconciling Machine {}/{}", namespace, name);
        let started = Instant::now();

        let result = self.reconcile_machine(namespace, name).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_reconcile(outcome.metric_label());
                if let Outcome::Configured { .. } = outcome {
                    self.metrics
                        .observe_duration(started.elapsed().as_secs_f64());
                }
            }
            Err(e) => {
                self.metrics.record_reconcile(outcomes::FAILED);
                self.metrics.record_failure(failure_stage(e));
            }
        }
        result
    }

    async fn reconcile_machine(&self, namespace: &str, name: &str) -> Result<Outcome> {
        if let Err(e) = self.user_data.ensure_secret(self.signer.as_deref()).await {
            error!(error = %e, "Error creating user data secret");
            self.metrics.record_failure(stages::USER_DATA);
        }

        let machine = self
            .client
            .get_machine(namespace, name)
            .await
            .map_err(|source| Error::Machine {
                name: name.to_string(),
                source: Box::new(source),
            })?;
        let Some(machine) = machine else {
            debug!("Machine {}/{} not found", namespace, name);
            return Ok(Outcome::NotFound);
        };

        let vm = match assess(&machine) {
            Ok(vm) => vm,
            Err(reason) => {
                debug!(%reason, "Skipping Machine {}/{}", namespace, name);
                return Ok(Outcome::Skipped(reason));
            }
        };

        self.log_cloud_resources(&machine, &vm).await;

        let object_ref = machine.object_ref(&());
        match self.bootstrap(&vm).await {
            Ok(node) => {
                info!(node = %node, "Windows VM {} has joined the cluster as a worker node", vm);
                self.events
                    .publish(
                        &object_ref,
                        EventType::Normal,
                        reasons::SETUP,
                        actions::RECONCILE,
                        Some(format!("Machine {} Configured Successfully", name)),
                    )
                    .await;
                Ok(Outcome::Configured { node })
            }
            Err(e) => {
                error!(error = %e, instance_id = %vm.instance_id, "Windows VM failed to be configured");
                self.events
                    .publish(
                        &object_ref,
                        EventType::Warning,
                        reasons::SETUP_FAILURE,
                        actions::RECONCILE,
                        Some(format!("Machine {} failed to be configured", name)),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Turn an eligible VM into a labelled worker node, returning its name
    async fn bootstrap(&self, vm: &WindowsVm) -> Result<String> {
        self.configurator.configure(vm).await.map_err(|e| match e {
            e @ Error::RemoteConfiguration { .. } => e,
            other => Error::RemoteConfiguration {
                instance_id: vm.instance_id.clone(),
                reason: other.to_string(),
            },
        })?;

        self.csrs.handle_all().await?;

        let node = self.nodes.find_node(&vm.instance_id).await?;
        let node = self.nodes.apply_worker_label(node).await?;
        let node_name = node.metadata.name.clone().unwrap_or_default();

        if self.config.configure_network {
            self.configure_network(vm, &node_name).await?;
        }
        Ok(node_name)
    }

    async fn configure_network(&self, vm: &WindowsVm, node_name: &str) -> Result<()> {
        let host_subnet = self
            .nodes
            .wait_for_host_subnet(node_name, &self.config.host_subnet_retry, &self.cancel)
            .await?;
        let options = CniOptions::new(self.service_network.clone(), host_subnet);

        let _guard = self.network_lock.lock().await;
        self.network.patch(&options).await?;
        self.configurator
            .configure_network(vm, self.network.template_path())
            .await
    }

    async fn log_cloud_resources(&self, machine: &Machine, vm: &WindowsVm) {
        let Some(cloud) = &self.cloud else { return };
        let Some(zone) = machine.provider_id().and_then(zone_from_provider_id) else {
            return;
        };
        match cloud.resolve(zone).await {
            Ok(resources) => debug!(
                vm = %vm,
                subnet = %resources.subnet,
                security_group = %resources.security_group,
                iam_instance_profile = %resources.iam_instance_profile,
                "Resolved cloud resources"
            ),
            Err(e) => warn!(vm = %vm, error = %e, "Unable to resolve cloud resources"),
        }
    }
}
