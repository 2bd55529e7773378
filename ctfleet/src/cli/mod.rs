use clap::{Parser, Subcommand};

pub use database::SqliteCliArgs;
pub use manager::{ManagerCmd, SchedulerCliArgs};
pub use server::ServerCliArgs;
pub use worker::WorkerCmd;

pub mod database;
pub mod manager;
pub mod server;
pub mod worker;

#[derive(Parser, Debug)]
#[command(
    name = "ctfleet",
    about = "Distributed Certificate Transparency log scanner",
    long_about = "ctfleet splits CT logs into fixed-size batches and hands them to a fleet of workers.\n\n\
    Quick Start:\n  \
    ctfleet manager --logs-file logs.yaml\n  \
    ctfleet worker --worker-name w1 --manager-url http://127.0.0.1:8080 --domain-suffix .jp"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the manager: task allocation, liveness sweeps and ingestion
    Manager {
        #[command(flatten)]
        manager_command: Box<ManagerCmd>,
    },
    /// Run a worker that pulls batches from the manager and scans them
    Worker {
        #[command(flatten)]
        worker_command: Box<WorkerCmd>,
    },
}
