use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::core::config::ManagerConfig;
use crate::error::FleetResult;
use crate::types::api::{UploadItem, UploadResponse};
use crate::types::certificate::{CertificateIdentity, CertificateRecord};

/// Accepts certificates uploaded by workers.
pub struct IngestService;

impl IngestService {
    /// Filters malformed items and known duplicates, then inserts the rest.
    /// The dedup cache only short-circuits; the store's uniqueness
    /// constraint decides.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn upload(config: &ManagerConfig, items: Vec<UploadItem>) -> FleetResult<UploadResponse> {
        let cache = config.dedup_cache();
        let mut response = UploadResponse::default();
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            let identity = CertificateIdentity::from(&item.entry);
            if !identity.is_complete() || item.log_name.trim().is_empty() {
                warn!(log_name = %item.log_name, index = item.index, worker = %item.worker_name, "Rejected malformed upload item");
                response.rejected += 1;
                continue;
            }
            if seen.contains(&identity) || cache.is_duplicate(&identity)? {
                response.skipped_duplicates += 1;
                continue;
            }
            seen.insert(identity.clone());
            records.push(CertificateRecord {
                identity,
                subject: item.entry.subject,
                dns_names: item.entry.dns_names,
                entry_type: item.entry.entry_type,
                timestamp: item.entry.timestamp,
                log_name: item.log_name,
                ct_log_url: item.ct_log_url,
                log_index: item.index,
                worker_name: item.worker_name,
            });
        }

        if !records.is_empty() {
            let outcome = config.database().insert_certificates(records).await?;
            response.inserted = outcome.inserted.len() as u64;
            response.skipped_duplicates += outcome.duplicates.len() as u64;
            for identity in outcome.inserted.into_iter().chain(outcome.duplicates) {
                cache.add(identity)?;
            }
        }

        if response.inserted > 0 {
            info!(inserted = response.inserted, duplicates = response.skipped_duplicates, "Certificates ingested");
        } else {
            debug!(duplicates = response.skipped_duplicates, rejected = response.rejected, "Nothing new to ingest");
        }
        Ok(response)
    }
}
