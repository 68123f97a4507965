//! Certificate Lifecycle Manager
//!
//! A new Windows kubelet submits two CSRs before it can join: the client
//! certificate request made with the bootstrap credentials, then the serving
//! certificate request made as `system:node:<name>`. Both have to be approved
//! by someone; for Windows machines that someone is this operator.
//!
//! Correlation is by requestor identity only. Two Windows machines
//! bootstrapping at the same time can therefore have their node CSRs
//! approved in either order.

use super::retry::{ConflictRetry, RetryPolicy};
use crate::domain::ClusterClientRef;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use chrono::Utc;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Requestor of the kubelet's bootstrap (client certificate) CSR
pub const BOOTSTRAPPER_REQUESTOR: &str =
    "system:serviceaccount:openshift-machine-config-operator:node-bootstrapper";

/// Requestor prefix of the kubelet's node (serving certificate) CSR
pub const NODE_REQUESTOR: &str = "system:node:";

pub const APPROVED: &str = "Approved";
pub const DENIED: &str = "Denied";

pub const APPROVAL_REASON: &str = "WMCOApprove";
pub const APPROVAL_MESSAGE: &str = "This CSR was approved by the Windows machine config operator";

/// Whether the CSR carries a condition of `condition_type`
fn has_condition(csr: &CertificateSigningRequest, condition_type: &str) -> bool {
    csr.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map_or(false, |conditions| {
            conditions.iter().any(|c| c.type_ == condition_type)
        })
}

/// Approved or denied CSRs are final
pub fn is_handled(csr: &CertificateSigningRequest) -> bool {
    has_condition(csr, APPROVED) || has_condition(csr, DENIED)
}

pub fn is_approved(csr: &CertificateSigningRequest) -> bool {
    has_condition(csr, APPROVED)
}

/// First pending CSR whose requestor contains `requestor`
pub fn select_pending<'a>(
    csrs: &'a [CertificateSigningRequest],
    requestor: &str,
) -> Option<&'a CertificateSigningRequest> {
    csrs.iter().find(|csr| {
        csr.spec
            .username
            .as_deref()
            .map_or(false, |user| user.contains(requestor))
            && !is_handled(csr)
    })
}

fn approval_condition() -> CertificateSigningRequestCondition {
    CertificateSigningRequestCondition {
        type_: APPROVED.to_string(),
        status: "True".to_string(),
        reason: Some(APPROVAL_REASON.to_string()),
        message: Some(APPROVAL_MESSAGE.to_string()),
        last_update_time: Some(Time(Utc::now())),
        last_transition_time: None,
    }
}

/// Finds and approves the CSRs a joining kubelet is waiting on
pub struct CertificateLifecycleManager {
    client: ClusterClientRef,
    policy: RetryPolicy,
    conflict_retry: ConflictRetry,
    cancel: CancellationToken,
    metrics: Option<Metrics>,
}

impl CertificateLifecycleManager {
    pub fn new(client: ClusterClientRef, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            client,
            policy,
            conflict_retry: ConflictRetry::default(),
            cancel,
            metrics: None,
        }
    }

    pub fn with_conflict_retry(mut self, conflict_retry: ConflictRetry) -> Self {
        self.conflict_retry = conflict_retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Approve the bootstrap CSR, then the node CSR
    pub async fn handle_all(&self) -> Result<()> {
        self.handle(BOOTSTRAPPER_REQUESTOR).await?;
        self.handle(NODE_REQUESTOR).await
    }

    /// Find the pending CSR submitted by `requestor` and approve it
    #[instrument(skip(self))]
    pub async fn handle(&self, requestor: &str) -> Result<()> {
        let wrap = |source: Error| Error::CsrApproval {
            requestor: requestor.to_string(),
            source: Box::new(source),
        };

        let csr = match self.find(requestor).await {
            Ok(Some(csr)) => csr,
            Ok(None) => {
                return Err(Error::CsrNotFound {
                    requestor: requestor.to_string(),
                })
            }
            Err(e @ Error::Cancelled(_)) => return Err(e),
            Err(e) => return Err(wrap(e)),
        };

        self.approve(&csr).await.map_err(wrap)
    }

    /// Poll for a pending CSR from `requestor`.
    ///
    /// `Ok(None)` means none showed up within the retry budget.
    pub async fn find(&self, requestor: &str) -> Result<Option<CertificateSigningRequest>> {
        let client = self.client.clone();
        self.policy
            .poll(&self.cancel, "find CSR", || {
                let client = client.clone();
                async move {
                    let csrs = client.list_csrs().await?;
                    Ok::<_, Error>(select_pending(&csrs, requestor).cloned())
                }
            })
            .await
    }

    /// Approve `csr`, a no-op when it is already approved
    pub async fn approve(&self, csr: &CertificateSigningRequest) -> Result<()> {
        let name = csr
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Internal("CSR has no name".into()))?;

        if is_approved(csr) {
            debug!(csr = %name, "CSR already approved");
            return Ok(());
        }

        let client = self.client.clone();
        let approved = self
            .conflict_retry
            .run("approve CSR", || {
                let client = client.clone();
                let name = name.clone();
                async move {
                    let mut current = client.get_csr(&name).await?;
                    if is_approved(&current) {
                        return Ok(false);
                    }
                    current
                        .status
                        .get_or_insert_with(Default::default)
                        .conditions
                        .get_or_insert_with(Vec::new)
                        .push(approval_condition());
                    client.update_csr_approval(&current).await?;
                    Ok::<_, Error>(true)
                }
            })
            .await?;

        if approved {
            info!(csr = %name, "CSR approved");
            if let Some(metrics) = &self.metrics {
                metrics.record_csr_approval();
            }
        }
        Ok(())
    }
}
