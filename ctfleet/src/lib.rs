pub mod cli;
pub mod core;
pub mod error;
pub mod manager;
pub mod server;
pub mod types;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub mod tests;

pub use error::{FleetError, FleetResult};
