pub mod api;
pub mod batch;
pub mod certificate;
pub mod log;
pub mod params;
