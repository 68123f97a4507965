//! Windows Machine Config Operator
//!
//! Watches Windows Machines in the machine-api namespace and bootstraps
//! each provisioned instance into a Kubernetes worker node.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use windows_machine_config_operator::bootstrap::controller;
use windows_machine_config_operator::bootstrap::userdata::DEFAULT_PRIVATE_KEY_PATH;
use windows_machine_config_operator::crd::MACHINE_API_NAMESPACE;
use windows_machine_config_operator::domain::KeySignerRef;
use windows_machine_config_operator::events::CONTROLLER_NAME;
use windows_machine_config_operator::network::DEFAULT_CNI_CONFIG_PATH;
use windows_machine_config_operator::{
    BootstrapConfig, BootstrapOrchestrator, CloudInfrastructureResolver, CloudProvider,
    CloudResolverFactory, ClusterIdentity, Context, SshKeySigner, Error, ExecConfigurator,
    KubeClusterClient, KubeEventPublisher, Metrics, Result, RetryPolicy, ServiceNetwork,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Windows Machine Config Operator - bootstraps Windows Machines into worker nodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace holding Windows Machines
    #[arg(long, env = "MACHINE_NAMESPACE", default_value = MACHINE_API_NAMESPACE)]
    namespace: String,

    /// Private key used to reach Windows instances (OpenSSH format, or PKCS#8 PEM for Ed25519)
    #[arg(long, env = "PRIVATE_KEY_PATH", default_value = DEFAULT_PRIVATE_KEY_PATH)]
    private_key_path: PathBuf,

    /// CNI template patched for each node
    #[arg(long, env = "CNI_CONFIG_PATH", default_value = DEFAULT_CNI_CONFIG_PATH)]
    cni_config_path: PathBuf,

    /// Executable that configures the Windows guest
    #[arg(long, env = "BOOTSTRAPPER_PATH", default_value = "/usr/local/bin/windows-node-bootstrapper")]
    bootstrapper_path: PathBuf,

    /// Time allowed for one bootstrapper invocation, in seconds
    #[arg(long, env = "CONFIGURE_TIMEOUT", default_value = "1800")]
    configure_timeout_secs: u64,

    /// Attempts made while waiting for a kubelet CSR
    #[arg(long, env = "CSR_RETRY_ATTEMPTS", default_value = "20")]
    csr_retry_attempts: u32,

    /// Seconds between CSR lookups
    #[arg(long, env = "CSR_RETRY_INTERVAL", default_value = "5")]
    csr_retry_interval_secs: u64,

    /// Overall budget for one CSR lookup, in seconds
    #[arg(long, env = "CSR_RETRY_DEADLINE")]
    csr_retry_deadline_secs: Option<u64>,

    /// Skip host subnet wait, CNI patching and network configuration
    #[arg(long, env = "SKIP_NETWORK_CONFIGURATION")]
    skip_network_configuration: bool,

    /// Cloud provider the cluster runs on
    #[arg(long, env = "CLOUD_PROVIDER", default_value = "aws")]
    cloud_provider: CloudProvider,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn bootstrap_config(&self) -> BootstrapConfig {
        let mut csr_retry = RetryPolicy::new(
            self.csr_retry_attempts,
            Duration::from_secs(self.csr_retry_interval_secs),
        );
        if let Some(deadline) = self.csr_retry_deadline_secs {
            csr_retry = csr_retry.with_deadline(Duration::from_secs(deadline));
        }

        BootstrapConfig {
            namespace: self.namespace.clone(),
            csr_retry,
            cni_config_path: self.cni_config_path.clone(),
            configure_network: !self.skip_network_configuration,
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Windows Machine Config Operator");
    info!("  Version: {}", windows_machine_config_operator::VERSION);
    info!("  Namespace: {}", args.namespace);
    info!("  Bootstrapper: {}", args.bootstrapper_path.display());
    info!("  CNI config: {}", args.cni_config_path.display());
    info!("  Cloud provider: {}", args.cloud_provider);

    let client = kube::Client::try_default().await?;
    let cluster = Arc::new(KubeClusterClient::new(client.clone()));

    // The service network is fixed for the lifetime of the cluster
    let service_network = ServiceNetwork::fetch(cluster.as_ref()).await?;
    info!("  Service network: {}", service_network);

    let signer: Option<KeySignerRef> = match SshKeySigner::load(&args.private_key_path).await {
        Ok(signer) => Some(Arc::new(signer)),
        Err(e) => {
            error!(error = %e, "Unable to load private key, user data secret will not be created");
            None
        }
    };

    let metrics = Metrics::new()?;
    let cancel = CancellationToken::new();

    let configurator = ExecConfigurator::new(&args.bootstrapper_path)
        .with_timeout(Duration::from_secs(args.configure_timeout_secs));
    let events = KubeEventPublisher::new(client.clone(), CONTROLLER_NAME);

    let mut orchestrator = BootstrapOrchestrator::new(
        args.bootstrap_config(),
        cluster.clone(),
        Arc::new(configurator),
        Arc::new(events),
        service_network,
        metrics.clone(),
        cancel.clone(),
    );
    if let Some(signer) = signer {
        orchestrator = orchestrator.with_signer(signer);
    }

    match ClusterIdentity::fetch(cluster.as_ref()).await {
        Ok(identity) => match CloudResolverFactory::create(args.cloud_provider, identity) {
            Ok(resolver) => {
                info!(
                    infrastructure = %resolver.cluster().infrastructure_name,
                    "Cloud resolver initialized"
                );
                orchestrator = orchestrator.with_cloud_resolver(resolver);
            }
            Err(e) => warn!(error = %e, "Cloud resolver unavailable"),
        },
        Err(e) => warn!(error = %e, "Unable to read cluster infrastructure"),
    }

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let served = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, served).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Stop in-flight polling when the process is asked to exit
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let ctx = Arc::new(Context::new(orchestrator));
    controller::run(client, ctx).await;

    info!("Operator shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Metrics) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", content_type)
                                .body(Body::from(buffer))
                                .unwrap(),
                            Err(e) => Response::builder()
                                .status(StatusCode::INTERNAL_SERVER_ERROR)
                                .body(Body::from(e.to_string()))
                                .unwrap(),
                        },
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("not found"))
                            .unwrap(),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
