use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::ResourceExt;
use node_observability_operator::controller::{
    self, KubeEventSink, KubeStore, MachineConfigPoolHealth, Reconciler, ReconcilerConfig,
};
use node_observability_operator::crd::NodeObservabilityMachineConfig;
use node_observability_operator::Error;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
    /// List managed NodeObservabilityMachineConfigs
    Info,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Seconds between passes once a resource has converged
    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value_t = 1800)]
    requeue_interval_secs: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "ERROR_BACKOFF_SECS", default_value_t = 180)]
    error_backoff_secs: u64,

    /// Seconds between passes while the profiling pool is rolling out
    #[arg(long, env = "POOL_POLL_INTERVAL_SECS", default_value_t = 60)]
    pool_poll_interval_secs: u64,

    /// Namespace that receives Kubernetes Events
    #[arg(long, env = "EVENTS_NAMESPACE", default_value = "default")]
    events_namespace: String,

    /// Listen address of the REST API
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    api_addr: SocketAddr,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl RunArgs {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            pool_poll_interval: Duration::from_secs(self.pool_poll_interval_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!(
                "Node Observability Operator v{}",
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
        Commands::Info => run_info().await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info() -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let api: kube::Api<NodeObservabilityMachineConfig> = kube::Api::all(client);
    let configs = api
        .list(&Default::default())
        .await
        .map_err(Error::KubeError)?;

    println!(
        "Managed NodeObservabilityMachineConfigs: {}",
        configs.items.len()
    );
    for config in &configs.items {
        println!(
            "  {} (crio: {}, kubelet: {})",
            config.name_any(),
            config.spec.enable_crio_profiling,
            config.spec.enable_kubelet_profiling
        );
    }
    Ok(())
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(args.log_json.then(|| fmt::layer().json().with_target(true)))
        .with((!args.log_json).then(|| fmt::layer().with_target(true)));

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = node_observability_operator::telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }

    info!(
        "Starting Node Observability Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let config = args.reconciler_config();
    info!(
        "Requeue every {:?}, error backoff {:?}, pool poll {:?}",
        config.requeue_interval, config.error_backoff, config.pool_poll_interval
    );

    let reconciler = Reconciler::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(KubeEventSink::new(client.clone(), args.events_namespace.clone())),
        Arc::new(MachineConfigPoolHealth::new(client.clone())),
        config,
    );

    let state = Arc::new(controller::ControllerState {
        client: client.clone(),
        reconciler,
    });

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let api_addr = args.api_addr;
        tokio::spawn(async move {
            if let Err(e) = node_observability_operator::rest_api::run_server(api_state, api_addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    // Run the main controller loop
    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    node_observability_operator::telemetry::shutdown_telemetry();

    result
}
