use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to open database at {path}: {message}")]
    Open { path: String, message: String },

    #[error("Database connection lock poisoned: {0}")]
    Poisoned(String),

    #[error("Blocking database task failed: {0}")]
    Join(String),

    #[error("Failed to encode column {column}: {message}")]
    Encode { column: &'static str, message: String },

    #[error("Value {value} does not fit column {column}")]
    OutOfRange { column: &'static str, value: u64 },
}
