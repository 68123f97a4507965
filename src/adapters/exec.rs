//! Command-based adapter for the [`RemoteConfigurator`] port
//!
//! Delegates the guest-side work to an external bootstrapper executable
//! that owns the remote session with the Windows instance:
//!
//! ```text
//! <program> configure         --address <ip> --instance-id <id> --machine <name>
//! <program> configure-network --address <ip> --instance-id <id> --cni-config <path>
//! ```

use crate::domain::{RemoteConfigurator, WindowsVm};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Default time allowed for one bootstrapper invocation
pub const DEFAULT_CONFIGURE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Runs an external bootstrapper executable per VM
#[derive(Debug, Clone)]
pub struct ExecConfigurator {
    program: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ExecConfigurator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: DEFAULT_CONFIGURE_TIMEOUT,
        }
    }

    /// Arguments placed before the subcommand on every invocation
    pub fn with_base_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, vm: &WindowsVm, args: &[&str]) -> Result<()> {
        let failed = |reason: String| Error::RemoteConfiguration {
            instance_id: vm.instance_id.clone(),
            reason,
        };

        debug!(program = %self.program.display(), ?args, vm = %vm, "Running bootstrapper");

        let child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "{} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteConfigurator for ExecConfigurator {
    async fn configure(&self, vm: &WindowsVm) -> Result<()> {
        info!("Configuring the Windows VM {}", vm);
        self.run(
            vm,
            &[
                "configure",
                "--address",
                &vm.ip_address,
                "--instance-id",
                &vm.instance_id,
                "--machine",
                &vm.machine_name,
            ],
        )
        .await
    }

    async fn configure_network(&self, vm: &WindowsVm, cni_config: &Path) -> Result<()> {
        info!("Configuring the network of Windows VM {}", vm);
        let cni_config = cni_config.display().to_string();
        self.run(
            vm,
            &[
                "configure-network",
                "--address",
                &vm.ip_address,
                "--instance-id",
                &vm.instance_id,
                "--cni-config",
                &cni_config,
            ],
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn vm() -> WindowsVm {
        WindowsVm {
            machine_name: "winworker-abc".into(),
            instance_id: "i-078285fdadccb2eaa".into(),
            ip_address: "10.0.1.1".into(),
        }
    }

    fn script(dir: &Path, body: &str) -> ExecConfigurator {
        let path = dir.join("bootstrapper.sh");
        std::fs::write(&path, format!("{}\n", body)).unwrap();
        ExecConfigurator::new("/bin/sh").with_base_args(vec![path.display().to_string()])
    }

    #[tokio::test]
    async fn test_configure_passes_vm_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args");
        let configurator = script(dir.path(), &format!("echo \"$@\" > {}", log.display()));

        configurator.configure(&vm()).await.unwrap();

        let args = std::fs::read_to_string(log).unwrap();
        assert_eq!(
            args.trim(),
            "configure --address 10.0.1.1 --instance-id i-078285fdadccb2eaa --machine winworker-abc"
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_remote_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let configurator = script(dir.path(), "echo 'ssh: connection refused' >&2; exit 3");

        let err = configurator
            .configure(&vm())
            .await
            .unwrap_err();
        assert_matches!(err, Error::RemoteConfiguration { ref instance_id, ref reason }
            if instance_id == "i-078285fdadccb2eaa" && reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_timeout_is_remote_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let configurator = script(dir.path(), "sleep 5");

        let err = configurator
            .with_timeout(Duration::from_millis(50))
            .configure_network(&vm(), Path::new("/tmp/cni.json"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::RemoteConfiguration { .. });
    }

    #[tokio::test]
    async fn test_missing_program_is_remote_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExecConfigurator::new(dir.path().join("absent"))
            .configure(&vm())
            .await
            .unwrap_err();
        assert_matches!(err, Error::RemoteConfiguration { .. });
    }
}
