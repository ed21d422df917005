//! Encode records and write them to the store for their category

use memcload_core::RetryPolicy;
use thiserror::Error;

use crate::codec::UserApps;
use crate::record::Record;
use crate::store::ClientMap;

#[derive(Debug, Error)]
pub enum InsertError {
    #[error("could not serialize record {key}: {source}")]
    Serialization {
        key: String,
        source: prost::EncodeError,
    },
    #[error("unexpected device type: {0:?}")]
    UnknownDeviceType(String),
    #[error("could not store {key} after {attempts} attempts: {cause:#}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        cause: anyhow::Error,
    },
}

/// Writes records to their category's store under a retry policy.
///
/// Holds the client map by reference; one writer is shared by all workers.
#[derive(Debug)]
pub struct CacheWriter<'a> {
    clients: &'a ClientMap,
    dry_run: bool,
    retry: RetryPolicy,
}

impl<'a> CacheWriter<'a> {
    pub fn new(clients: &'a ClientMap, dry_run: bool, retry: RetryPolicy) -> Self {
        Self {
            clients,
            dry_run,
            retry,
        }
    }

    /// Store `record` under `"{type}:{id}"`.
    ///
    /// Dry runs only log the text form. Encoding failures and unknown
    /// categories are not retried.
    pub fn insert(&self, record: &Record) -> Result<(), InsertError> {
        let key = record.key();
        let message = UserApps::from(record);

        if self.dry_run {
            log::debug!("{key} -> {}", message.to_text());
            return Ok(());
        }

        let payload = message
            .to_bytes()
            .map_err(|source| {
                log::warn!("Could not serialize record {key}: {source}");
                InsertError::Serialization {
                    key: key.clone(),
                    source,
                }
            })?;

        let Some(store) = self.clients.get(&record.device_type) else {
            log::warn!("Unexpected device type: {:?}", record.device_type);
            return Err(InsertError::UnknownDeviceType(record.device_type.clone()));
        };

        self.retry
            .run(&key, |_| store.set(&key, &payload))
            .map_err(|cause| {
                log::warn!(
                    "Could not store {key} in {:?} store: {cause:#}",
                    record.device_type
                );
                InsertError::RetriesExhausted {
                    key: key.clone(),
                    attempts: self.retry.max_attempts(),
                    cause,
                }
            })
    }
}
