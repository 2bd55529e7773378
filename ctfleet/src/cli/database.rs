use clap::Args;

/// Parameters used to open the relational store.
#[derive(Debug, Clone, Args)]
#[group()]
pub struct SqliteCliArgs {
    /// Path to the SQLite database file. `:memory:` keeps everything in memory.
    #[arg(env = "CTFLEET_DATABASE_PATH", long, default_value = "ctfleet.sqlite")]
    pub database_path: String,
}
