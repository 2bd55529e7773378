pub mod database;
pub mod lock;

pub use database::{DatabaseClient, DatabaseError, SqliteClient};
pub use lock::{LockError, LockKey, LockRegistry};
