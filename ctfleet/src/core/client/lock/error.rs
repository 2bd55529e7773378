use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LockError {
    #[error("Mutex poisoned while guarding {what}: {message}")]
    Poisoned { what: &'static str, message: String },
}

impl LockError {
    pub fn poisoned(what: &'static str, err: impl std::fmt::Display) -> Self {
        LockError::Poisoned { what, message: err.to_string() }
    }
}
