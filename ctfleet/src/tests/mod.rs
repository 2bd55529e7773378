
pub mod common;

pub mod manager;

pub mod server;

pub mod worker;
