use std::sync::Arc;
use std::time::Duration;

use clap::Parser as _;
use ctfleet::cli::{Cli, Commands, ManagerCmd, WorkerCmd};
use ctfleet::core::config::ManagerConfig;
use ctfleet::manager::spawn_background_tasks;
use ctfleet::server::setup_server;
use ctfleet::types::params::{ManagerParams, WorkerParams};
use ctfleet::utils::logging::init_logging;
use ctfleet::utils::shutdown::ShutdownListener;
use ctfleet::worker::run_worker;
use ctfleet::FleetResult;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Manager { manager_command } => run_manager(*manager_command).await,
        Commands::Worker { worker_command } => run_worker_role(*worker_command).await,
    };
    if let Err(e) = result {
        error!(error = %e, error_chain = ?e, "ctfleet stopped with an error");
        std::process::exit(1);
    }
}

async fn run_manager(cmd: ManagerCmd) -> FleetResult<()> {
    info!("Starting ctfleet manager");
    let params = ManagerParams::from(cmd);
    let config = Arc::new(ManagerConfig::from_params(params).await?);
    debug!("Configuration initialized");

    let (address, server) = setup_server(config.clone()).await?;
    let background_token = CancellationToken::new();
    let background = spawn_background_tasks(config, background_token.clone());
    info!(address = %address, "Manager running");

    let mut shutdown = ShutdownListener::new();
    shutdown.wait().await;
    shutdown
        .drain(
            async move {
                background_token.cancel();
                for handle in background {
                    handle.await?;
                }
                server.shutdown().await?;
                Ok::<(), anyhow::Error>(())
            },
            SHUTDOWN_TIMEOUT,
        )
        .await?;
    info!("Manager stopped");
    Ok(())
}

async fn run_worker_role(cmd: WorkerCmd) -> FleetResult<()> {
    let params = WorkerParams::from(cmd);
    info!(worker = %params.worker_name, "Starting ctfleet worker");
    let token = CancellationToken::new();
    let mut shutdown = ShutdownListener::new();
    let finished = shutdown.role_finished_handle();

    let worker_token = token.clone();
    let worker = tokio::spawn(
        async move {
            let result = run_worker(params, worker_token).await;
            finished.notify_one();
            result
        }
        .instrument(info_span!("worker", role = "worker")),
    );

    shutdown.wait().await;
    token.cancel();
    shutdown
        .drain(
            async move {
                worker.await??;
                Ok::<(), anyhow::Error>(())
            },
            SHUTDOWN_TIMEOUT,
        )
        .await?;
    Ok(())
}
