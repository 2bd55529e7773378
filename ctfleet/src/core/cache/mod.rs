pub mod dedup;
pub mod ttl;

pub use dedup::DedupCache;
pub use ttl::TtlCache;
