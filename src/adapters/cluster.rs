//! Kubernetes adapter for the [`ClusterClient`] port

use crate::crd::{Infrastructure, Machine, Network, CLUSTER_CONFIG_NAME};
use crate::domain::ClusterClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use tracing::trace;

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn object_name<'a>(name: &'a Option<String>, kind: &str) -> Result<&'a str> {
    name.as_deref()
        .ok_or_else(|| Error::Internal(format!("{} has no name", kind)))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn list_csrs(&self) -> Result<Vec<CertificateSigningRequest>> {
        let api: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        trace!(count = list.items.len(), "Listed CSRs");
        Ok(list.items)
    }

    async fn get_csr(&self, name: &str) -> Result<CertificateSigningRequest> {
        let api: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn update_csr_approval(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest> {
        let name = object_name(&csr.metadata.name, "CertificateSigningRequest")?;
        let api: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        let body = serde_json::to_vec(csr)?;
        Ok(api
            .replace_subresource("approval", name, &PostParams::default(), body)
            .await?)
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn replace_node(&self, node: &Node) -> Result<Node> {
        let name = object_name(&node.metadata.name, "Node")?;
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.replace(name, &PostParams::default(), node).await?)
    }

    async fn get_network(&self) -> Result<Network> {
        let api: Api<Network> = Api::all(self.client.clone());
        Ok(api.get(CLUSTER_CONFIG_NAME).await?)
    }

    async fn get_infrastructure(&self) -> Result<Infrastructure> {
        let api: Api<Infrastructure> = Api::all(self.client.clone());
        Ok(api.get(CLUSTER_CONFIG_NAME).await?)
    }
}
