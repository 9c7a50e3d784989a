//! Cluster-wide master key bootstrap

use super::events::EventPublisher;
use crate::error::{StorageError, SyncError, SyncResult};
use crate::storage::{Document, DocumentStore};
use chrono::Utc;
use modelsync_crypto::{Encryptor, KeyMaterial};
use modelsync_types::{MasterKeyRecord, SyncEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How `ensure` left the local encryptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterKeyStatus {
    /// The persisted key was already installed
    AlreadyInstalled,
    /// The persisted key was installed
    Installed,
    /// This process created the cluster key
    Created,
    /// Lost the create race and adopted the winner's key
    Adopted,
}

/// Makes sure exactly one master key exists and is installed locally
pub struct MasterKeyBootstrapper {
    store: Arc<dyn DocumentStore>,
    encryptor: Arc<dyn Encryptor>,
    collection: String,
    key_id: String,
    events: EventPublisher,
    // Serializes concurrent ensure() calls from this process.
    lock: Mutex<()>,
}

impl MasterKeyBootstrapper {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        encryptor: Arc<dyn Encryptor>,
        collection: impl Into<String>,
        key_id: impl Into<String>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            encryptor,
            collection: collection.into(),
            key_id: key_id.into(),
            events,
            lock: Mutex::new(()),
        }
    }

    /// Fingerprint of the locally installed key, if any
    pub fn installed_fingerprint(&self) -> Option<String> {
        self.encryptor.fingerprint()
    }

    /// Idempotent; safe to call on every tick.
    ///
    /// Storage failures are returned to the caller and not retried here.
    pub async fn ensure(&self) -> SyncResult<MasterKeyStatus> {
        let _guard = self.lock.lock().await;

        if let Some(record) = self.read().await? {
            return self.install_persisted(&record, MasterKeyStatus::Installed);
        }

        let material = self.encryptor.generate_key();
        let fingerprint = material.fingerprint();
        let record = MasterKeyRecord::new(material.encode(), Utc::now());
        self.encryptor.install_key(material)?;

        let document = Document::new(self.key_id.clone(), record.to_document());
        match self.store.create_if_absent(&self.collection, document).await {
            Ok(()) => {
                tracing::info!(fingerprint = %fingerprint, "Created cluster master key");
                self.events
                    .emit(None, SyncEvent::MasterKeyCreated { fingerprint });
                Ok(MasterKeyStatus::Created)
            }
            Err(StorageError::Conflict(_)) => {
                tracing::info!("Master key created concurrently, adopting the stored key");
                let record = self.read().await?.ok_or_else(|| {
                    SyncError::MasterKeyInvalid(
                        "create conflicted but no master key is stored".to_string(),
                    )
                })?;
                self.install_persisted(&record, MasterKeyStatus::Adopted)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn read(&self) -> SyncResult<Option<MasterKeyRecord>> {
        let Some(document) = self.store.get(&self.collection, &self.key_id).await? else {
            return Ok(None);
        };
        MasterKeyRecord::from_document(&document.source)
            .map(Some)
            .map_err(|e| SyncError::MasterKeyInvalid(e.to_string()))
    }

    fn install_persisted(
        &self,
        record: &MasterKeyRecord,
        status: MasterKeyStatus,
    ) -> SyncResult<MasterKeyStatus> {
        let material = KeyMaterial::decode(&record.master_key)?;
        let fingerprint = material.fingerprint();

        if self.encryptor.fingerprint().as_deref() == Some(fingerprint.as_str()) {
            return Ok(MasterKeyStatus::AlreadyInstalled);
        }

        self.encryptor.install_key(material)?;
        if status == MasterKeyStatus::Adopted {
            self.events
                .emit(None, SyncEvent::MasterKeyAdopted { fingerprint });
        } else {
            tracing::info!(fingerprint = %fingerprint, "Installed stored master key");
        }
        Ok(status)
    }
}
