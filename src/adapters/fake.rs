//! In-memory test doubles for the domain ports

use crate::crd::{
    Infrastructure, InfrastructureSpec, InfrastructureStatus, Machine, Network, NetworkSpec,
    CLUSTER_CONFIG_NAME,
};
use crate::domain::{ClusterClient, RemoteConfigurator, WindowsVm};
use crate::error::{api_error, Error, Result};
use crate::events::EventPublisher;
use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
    CertificateSigningRequestStatus,
};
use k8s_openapi::api::core::v1::{Node, NodeSpec, ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::runtime::events::EventType;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// API failure injected into the fake, as (HTTP code, reason)
type Failure = (u16, &'static str);

#[derive(Default)]
struct State {
    machines: BTreeMap<(String, String), Machine>,
    secrets: BTreeMap<(String, String), Secret>,
    csrs: BTreeMap<String, CertificateSigningRequest>,
    nodes: BTreeMap<String, Node>,
    network: Option<Network>,
    infrastructure: Option<Infrastructure>,

    secret_creations: usize,
    csr_approval_updates: usize,
    node_replacements: usize,
    resource_version: u64,

    fail_secret_get: Option<Failure>,
    fail_secret_create: Option<Failure>,
    csr_conflicts: usize,
    node_conflicts: usize,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// In-memory [`ClusterClient`] with resourceVersion semantics
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine(&self, namespace: &str, machine: Machine) {
        let name = machine.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.machines.insert((namespace.to_string(), name), machine);
    }

    /// Add a pending CSR submitted by `username`
    pub fn add_csr(&self, name: &str, username: &str) {
        self.add_csr_with_conditions(name, username, vec![]);
    }

    pub fn add_csr_with_conditions(
        &self,
        name: &str,
        username: &str,
        conditions: Vec<CertificateSigningRequestCondition>,
    ) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let csr = CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(version),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                username: Some(username.to_string()),
                signer_name: "kubernetes.io/kube-apiserver-client-kubelet".to_string(),
                request: ByteString(b"-----BEGIN CERTIFICATE REQUEST-----".to_vec()),
                ..Default::default()
            },
            status: if conditions.is_empty() {
                None
            } else {
                Some(CertificateSigningRequestStatus {
                    conditions: Some(conditions),
                    ..Default::default()
                })
            },
        };
        state.csrs.insert(name.to_string(), csr);
    }

    /// Add a Windows node with the given provider id and labels
    pub fn add_node(&self, name: &str, provider_id: &str, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let node = Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(version),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some(provider_id.to_string()),
                ..Default::default()
            }),
            status: None,
        };
        state.nodes.insert(name.to_string(), node);
    }

    pub fn annotate_node(&self, name: &str, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(node) = state.nodes.get_mut(name) {
            node.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            node.metadata.resource_version = Some(version);
        }
    }

    pub fn set_service_network(&self, cidrs: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.network = Some(Network::new(
            CLUSTER_CONFIG_NAME,
            NetworkSpec {
                service_network: cidrs.iter().map(|c| c.to_string()).collect(),
                network_type: Some("OVNKubernetes".into()),
            },
        ));
    }

    pub fn set_infrastructure(&self, status: InfrastructureStatus) {
        let mut infra = Infrastructure::new(CLUSTER_CONFIG_NAME, InfrastructureSpec {});
        infra.status = Some(status);
        self.state.lock().unwrap().infrastructure = Some(infra);
    }

    pub fn fail_secret_get(&self, code: u16, reason: &'static str) {
        self.state.lock().unwrap().fail_secret_get = Some((code, reason));
    }

    pub fn fail_secret_create(&self, code: u16, reason: &'static str) {
        self.state.lock().unwrap().fail_secret_create = Some((code, reason));
    }

    /// Make the next `count` CSR approval updates fail with a conflict
    pub fn conflict_csr_updates(&self, count: usize) {
        self.state.lock().unwrap().csr_conflicts = count;
    }

    /// Make the next `count` node replacements fail with a conflict
    pub fn conflict_node_updates(&self, count: usize) {
        self.state.lock().unwrap().node_conflicts = count;
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        let state = self.state.lock().unwrap();
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn csr(&self, name: &str) -> Option<CertificateSigningRequest> {
        self.state.lock().unwrap().csrs.get(name).cloned()
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(name).cloned()
    }

    pub fn secret_creations(&self) -> usize {
        self.state.lock().unwrap().secret_creations
    }

    pub fn csr_approval_updates(&self) -> usize {
        self.state.lock().unwrap().csr_approval_updates
    }

    pub fn node_replacements(&self) -> usize {
        self.state.lock().unwrap().node_replacements
    }
}

fn not_found() -> Error {
    api_error(404, "NotFound")
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .machines
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let state = self.state.lock().unwrap();
        if let Some((code, reason)) = state.fail_secret_get {
            return Err(api_error(code, reason));
        }
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((code, reason)) = state.fail_secret_create {
            return Err(api_error(code, reason));
        }
        let key = (
            namespace.to_string(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        if state.secrets.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.secrets.insert(key, secret.clone());
        state.secret_creations += 1;
        Ok(())
    }

    async fn list_csrs(&self) -> Result<Vec<CertificateSigningRequest>> {
        Ok(self.state.lock().unwrap().csrs.values().cloned().collect())
    }

    async fn get_csr(&self, name: &str) -> Result<CertificateSigningRequest> {
        self.state
            .lock()
            .unwrap()
            .csrs
            .get(name)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn update_csr_approval(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest> {
        let mut state = self.state.lock().unwrap();
        if state.csr_conflicts > 0 {
            state.csr_conflicts -= 1;
            // someone else touched the object in the meantime
            let version = state.next_version();
            let name = csr.metadata.name.clone().unwrap_or_default();
            if let Some(stored) = state.csrs.get_mut(&name) {
                stored.metadata.resource_version = Some(version);
            }
            return Err(api_error(409, "Conflict"));
        }

        let name = csr.metadata.name.clone().unwrap_or_default();
        let stored_version = state
            .csrs
            .get(&name)
            .ok_or_else(not_found)?
            .metadata
            .resource_version
            .clone();
        if stored_version != csr.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }

        let mut updated = csr.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.csrs.insert(name, updated.clone());
        state.csr_approval_updates += 1;
        Ok(updated)
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>> {
        let (key, value) = label_selector
            .split_once('=')
            .ok_or_else(|| Error::Internal(format!("unsupported selector {}", label_selector)))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .values()
            .filter(|n| {
                n.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(key))
                    .map_or(false, |v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.state.lock().unwrap().nodes.get(name).cloned())
    }

    async fn replace_node(&self, node: &Node) -> Result<Node> {
        let mut state = self.state.lock().unwrap();
        let name = node.metadata.name.clone().unwrap_or_default();
        if state.node_conflicts > 0 {
            state.node_conflicts -= 1;
            let version = state.next_version();
            if let Some(stored) = state.nodes.get_mut(&name) {
                stored.metadata.resource_version = Some(version);
            }
            return Err(api_error(409, "Conflict"));
        }

        let stored_version = state
            .nodes
            .get(&name)
            .ok_or_else(not_found)?
            .metadata
            .resource_version
            .clone();
        if stored_version != node.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }

        let mut updated = node.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.nodes.insert(name, updated.clone());
        state.node_replacements += 1;
        Ok(updated)
    }

    async fn get_network(&self) -> Result<Network> {
        self.state
            .lock()
            .unwrap()
            .network
            .clone()
            .ok_or_else(not_found)
    }

    async fn get_infrastructure(&self) -> Result<Infrastructure> {
        self.state
            .lock()
            .unwrap()
            .infrastructure
            .clone()
            .ok_or_else(not_found)
    }
}

// =============================================================================
// Remote Configurator
// =============================================================================

/// Records calls; optionally fails `configure`
#[derive(Default)]
pub struct FakeConfigurator {
    fail_with: Option<String>,
    configured: Mutex<Vec<WindowsVm>>,
    networks: Mutex<Vec<(WindowsVm, PathBuf)>>,
}

impl FakeConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn configured(&self) -> Vec<WindowsVm> {
        self.configured.lock().unwrap().clone()
    }

    pub fn networks(&self) -> Vec<(WindowsVm, PathBuf)> {
        self.networks.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConfigurator for FakeConfigurator {
    async fn configure(&self, vm: &WindowsVm) -> Result<()> {
        self.configured.lock().unwrap().push(vm.clone());
        match &self.fail_with {
            Some(reason) => Err(Error::RemoteConfiguration {
                instance_id: vm.instance_id.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn configure_network(&self, vm: &WindowsVm, cni_config: &Path) -> Result<()> {
        self.networks
            .lock()
            .unwrap()
            .push((vm.clone(), cni_config.to_path_buf()));
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event captured by [`RecordingEventPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub object: Option<String>,
    pub type_: EventType,
    pub reason: String,
    pub note: Option<String>,
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone(),
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}
