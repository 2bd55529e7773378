use ctfleet_entry_parser::{LogEntryType, ParsedCertificate};
use serde::{Deserialize, Serialize};

/// The uniqueness key of an ingested certificate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateIdentity {
    pub issuer: String,
    pub serial_number: String,
    pub fingerprint: String,
}

impl CertificateIdentity {
    pub fn is_complete(&self) -> bool {
        !self.issuer.is_empty() && !self.serial_number.is_empty() && !self.fingerprint.is_empty()
    }
}

impl From<&ParsedCertificate> for CertificateIdentity {
    fn from(cert: &ParsedCertificate) -> Self {
        Self {
            issuer: cert.issuer.clone(),
            serial_number: cert.serial_number.clone(),
            fingerprint: cert.fingerprint.clone(),
        }
    }
}

/// A certificate row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateRecord {
    pub identity: CertificateIdentity,
    pub subject: String,
    pub dns_names: Vec<String>,
    pub entry_type: LogEntryType,
    pub timestamp: u64,
    pub log_name: String,
    pub ct_log_url: String,
    pub log_index: u64,
    pub worker_name: String,
}

/// What the store did with a set of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub inserted: Vec<CertificateIdentity>,
    /// Identities the uniqueness constraint rejected.
    pub duplicates: Vec<CertificateIdentity>,
}
