pub mod ingest;
pub mod liveness;
pub mod status;
