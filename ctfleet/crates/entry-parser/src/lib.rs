//! Certificate Transparency log entry parsing.
//!
//! The scheduler treats parsing as an opaque collaborator: it hands a raw
//! `get-entries` item to an [`EntryParser`] and either gets a structured
//! record back or learns that the entry is not applicable.

mod der;
mod leaf;

use mockall::automock;
use serde::{Deserialize, Serialize};

pub use leaf::DerEntryParser;

/// One raw item of a `get-entries` response, both fields base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogEntry {
    pub leaf_input: String,
    #[serde(default)]
    pub extra_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    X509,
    Precert,
}

/// The structured record produced for an interesting log entry.
///
/// `(issuer, serial_number, fingerprint)` is the identity used for
/// de-duplication on the ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCertificate {
    pub issuer: String,
    pub serial_number: String,
    pub fingerprint: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub dns_names: Vec<String>,
    pub entry_type: LogEntryType,
    /// Leaf timestamp in milliseconds since the epoch.
    pub timestamp: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid base64 in {field}: {message}")]
    Base64 { field: &'static str, message: String },

    #[error("leaf input truncated at offset {0}")]
    Truncated(usize),

    #[error("malformed DER: {0}")]
    Der(String),
}

/// Trait every entry parser implements.
#[automock]
pub trait EntryParser: Send + Sync {
    /// Returns `Ok(None)` when the entry is well formed but not interesting
    /// (unknown leaf type, or filtered out).
    fn parse(&self, entry: &RawLogEntry) -> Result<Option<ParsedCertificate>, ParseError>;
}
