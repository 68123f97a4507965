//! Machine controller
//!
//! Drives the [`BootstrapOrchestrator`] from a watch on Windows Machines.

use super::orchestrator::{BootstrapOrchestrator, Outcome};
use crate::crd::{Machine, MACHINE_OS_LABEL, WINDOWS_OS_ID};
use crate::error::{Error, ErrorAction};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before retrying transient failures
pub const BACKOFF_REQUEUE: Duration = Duration::from_secs(5);

/// Shared controller context
pub struct Context {
    pub orchestrator: BootstrapOrchestrator,
}

impl Context {
    pub fn new(orchestrator: BootstrapOrchestrator) -> Self {
        Self { orchestrator }
    }
}

/// Label selector for Windows Machines
pub fn windows_machine_selector() -> String {
    format!("{}={}", MACHINE_OS_LABEL, WINDOWS_OS_ID)
}

/// Reconcile one Machine
pub async fn reconcile(machine: Arc<Machine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = machine
        .namespace()
        .unwrap_or_else(|| ctx.orchestrator.config().namespace.clone());
    let name = machine.name_any();

    match ctx.orchestrator.reconcile(&namespace, &name).await? {
        Outcome::Configured { node } => {
            debug!(machine = %name, %node, "Machine configured");
        }
        Outcome::Skipped(reason) => {
            debug!(machine = %name, %reason, "Machine skipped");
        }
        Outcome::NotFound => {}
    }
    Ok(Action::await_change())
}

/// Map a reconcile error to a requeue decision
pub fn error_policy(machine: Arc<Machine>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        %error,
        machine = %machine.name_any(),
        "reconciliation failed"
    );

    match error.action() {
        ErrorAction::RequeueWithBackoff => Action::requeue(BACKOFF_REQUEUE),
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

/// Run the controller until SIGTERM or Ctrl-C
pub async fn run(client: Client, ctx: Arc<Context>) {
    let namespace = ctx.orchestrator.config().namespace.clone();
    let machines: Api<Machine> = Api::namespaced(client, &namespace);
    let watcher_config = WatcherConfig::default().labels(&windows_machine_selector());

    info!(
        namespace = %namespace,
        selector = %windows_machine_selector(),
        "Starting Windows Machine controller"
    );

    Controller::new(machines, watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(machine = %object.name, ?action, "Machine reconciliation completed");
                }
                Err(e) => {
                    warn!(error = %e, "Machine reconciliation error");
                }
            }
        })
        .await;

    info!("Windows Machine controller stopped");
}
