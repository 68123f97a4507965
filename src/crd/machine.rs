//! Machine CRD
//!
//! Read-only view of the `machine.openshift.io/v1beta1` Machine objects
//! created by the machine-api. Only the fields the bootstrap flow consumes
//! are modelled; everything else in the object is ignored on decode.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace the machine-api keeps its Machine objects in
pub const MACHINE_API_NAMESPACE: &str = "openshift-machine-api";

/// Label the machine-api sets on Machines that will run Windows
pub const MACHINE_OS_LABEL: &str = "machine.openshift.io/os-id";

/// Value of [`MACHINE_OS_LABEL`] for Windows machines
pub const WINDOWS_OS_ID: &str = "Windows";

/// Phase a Machine reports once its instance exists and has addresses
pub const PROVISIONED_PHASE: &str = "Provisioned";

/// Address type used to reach the guest OS
pub const INTERNAL_IP: &str = "InternalIP";

// =============================================================================
// Machine CRD
// =============================================================================

/// Machine is the machine-api representation of a single cloud instance.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    plural = "machines",
    status = "MachineStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "ProviderID", "type": "string", "jsonPath": ".spec.providerID"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Cloud provider identifier, e.g. `aws:///us-east-1e/i-078285fdadccb2eaa`
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Observed state of a Machine
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Lifecycle phase (Provisioning, Provisioned, Running, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Addresses assigned to the instance
    #[serde(default)]
    pub addresses: Vec<MachineAddress>,
}

/// A single instance address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MachineAddress {
    /// Address type (InternalIP, ExternalIP, InternalDNS, ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// The address itself
    pub address: String,
}

impl Machine {
    /// Lifecycle phase, if the machine-api has reported one
    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    /// The last InternalIP address reported for the instance
    pub fn internal_ip(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| {
            s.addresses
                .iter()
                .filter(|a| a.type_ == INTERNAL_IP && !a.address.is_empty())
                .map(|a| a.address.as_str())
                .last()
        })
    }

    /// Provider identifier, treating an empty string as absent
    pub fn provider_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Extract the instance identifier from a cloud provider identifier.
///
/// The instance id is always the final `/`-delimited segment:
/// `aws:///us-east-1e/i-078285fdadccb2eaa` yields `i-078285fdadccb2eaa`.
/// A trailing slash yields an empty string.
pub fn instance_id_from_provider_id(provider_id: &str) -> &str {
    provider_id.rsplit('/').next().unwrap_or("")
}
