//! Kubernetes Event recording
//!
//! Bootstrap results are surfaced on the Machine object as standard
//! Kubernetes Events, visible via `kubectl describe machine`. Publishing is
//! fire-and-forget: a failed event is logged and never fails reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::sync::Arc;
use tracing::warn;

/// Controller name reported on Events
pub const CONTROLLER_NAME: &str = "windowsmachineconfig-controller";

/// Publishes Events about a cluster object
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

pub type EventPublisherRef = Arc<dyn EventPublisher>;

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    client: Client,
    reporter: Reporter,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            resource_ref.clone(),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons shown in the REASON column
pub mod reasons {
    /// Machine configured and joined as a worker node
    pub const SETUP: &str = "Setup";
    /// Configuring the machine failed
    pub const SETUP_FAILURE: &str = "SetupFailure";
}

/// Event actions shown in the ACTION column
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
}
