// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Workflows
//!
//! Patient and recipient sides of the emergency access flow, composed from
//! the crypto primitives, the registry, and a blob store.
//!
//! ```text
//! Patient:   pack -> put blob -> uploadRecord -> resolve keys -> wrap -> batchGrantAccess
//! Recipient: getRecordReference -> getWrappedKey -> unwrap -> get blob -> unpack
//! ```
//!
//! Every workflow takes a caller-supplied timeout. Nothing here retries; a
//! failure is returned as-is and the caller decides whether to resubmit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    crypto::{
        generate_key, pack, parse_public_key, unpack, unwrap_symmetric_key, wrap, CryptoError,
        FileDescriptor, FileMetadata, IdentityKeyPair, SymmetricKey,
    },
    error::ErrorClass,
    models::Identity,
    registry::{Registry, RegistryError},
    storage::{BlobStore, ContentId, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Crypto(e) => e.class(),
            ClientError::Registry(e) => e.class(),
            ClientError::Store(e) => e.class(),
            ClientError::Timeout(_) => ErrorClass::Resource,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

async fn within<T>(
    timeout: Duration,
    work: impl Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

/// Result of publishing a record.
#[derive(Debug)]
pub struct PublishedRecord {
    /// Content id the record reference points at.
    pub content_reference: ContentId,
    /// Key the record was encrypted under. Needed to authorize more recipients later.
    pub key: SymmetricKey,
}

/// The record owner's side of the flow.
pub struct PatientClient<B> {
    keys: IdentityKeyPair,
    registry: Arc<Registry>,
    blobs: Arc<B>,
}

impl<B: BlobStore> PatientClient<B> {
    pub fn new(keys: IdentityKeyPair, registry: Arc<Registry>, blobs: Arc<B>) -> Self {
        Self {
            keys,
            registry,
            blobs,
        }
    }

    pub fn identity(&self) -> &Identity {
        self.keys.identity()
    }

    /// Publish the patient's own public key to the directory.
    pub async fn register(&self) -> ClientResult<()> {
        self.registry
            .publish_public_key(self.keys.identity(), &self.keys.compressed_public_key())
            .await?;
        Ok(())
    }

    /// Encrypt `plaintext`, store it, register it, and grant every recipient
    /// access in one batch.
    pub async fn publish(
        &self,
        plaintext: &[u8],
        file: &FileDescriptor,
        recipients: &[Identity],
        timeout: Duration,
    ) -> ClientResult<PublishedRecord> {
        within(timeout, self.publish_inner(plaintext, file, recipients)).await
    }

    async fn publish_inner(
        &self,
        plaintext: &[u8],
        file: &FileDescriptor,
        recipients: &[Identity],
    ) -> ClientResult<PublishedRecord> {
        let key = generate_key()?;
        let package = pack(plaintext, file, &key, Utc::now())?;
        let content_reference = self.blobs.put(package.to_bytes()?).await?;

        self.registry
            .upload_record(self.keys.identity(), content_reference.as_str())
            .await?;

        if !recipients.is_empty() {
            let wrapped_keys = recipients
                .iter()
                .map(|recipient| self.wrap_for(recipient, &key))
                .collect::<ClientResult<Vec<_>>>()?;
            self.registry
                .batch_grant_access(self.keys.identity(), recipients.to_vec(), wrapped_keys, None)
                .await?;
        }

        tracing::info!(
            owner = %self.keys.identity(),
            reference = %content_reference,
            recipients = recipients.len(),
            "Record published"
        );
        Ok(PublishedRecord {
            content_reference,
            key,
        })
    }

    /// Grant one more recipient access, optionally until `expires_at`.
    pub async fn authorize(
        &self,
        recipient: &Identity,
        key: &SymmetricKey,
        expires_at: Option<DateTime<Utc>>,
    ) -> ClientResult<()> {
        let wrapped_key = self.wrap_for(recipient, key)?;
        self.registry
            .grant_access(self.keys.identity(), recipient, wrapped_key, expires_at)
            .await?;
        Ok(())
    }

    /// Revoke a recipient. Returns `false` if they had no access.
    pub async fn revoke(&self, recipient: &Identity) -> ClientResult<bool> {
        Ok(self
            .registry
            .revoke_access(self.keys.identity(), recipient)
            .await?)
    }

    fn wrap_for(&self, recipient: &Identity, key: &SymmetricKey) -> ClientResult<Vec<u8>> {
        let entry = self.registry.get_public_key(recipient)?;
        let public_key = parse_public_key(&entry.public_key)?;
        Ok(wrap(key.as_bytes(), &public_key)?.to_bytes())
    }
}

/// An emergency responder's side of the flow.
pub struct RecipientClient<B> {
    keys: IdentityKeyPair,
    registry: Arc<Registry>,
    blobs: Arc<B>,
}

impl<B: BlobStore> RecipientClient<B> {
    pub fn new(keys: IdentityKeyPair, registry: Arc<Registry>, blobs: Arc<B>) -> Self {
        Self {
            keys,
            registry,
            blobs,
        }
    }

    pub fn identity(&self) -> &Identity {
        self.keys.identity()
    }

    pub async fn register(&self) -> ClientResult<()> {
        self.registry
            .publish_public_key(self.keys.identity(), &self.keys.compressed_public_key())
            .await?;
        Ok(())
    }

    /// Fetch and decrypt `owner`'s record.
    pub async fn open(
        &self,
        owner: &Identity,
        timeout: Duration,
    ) -> ClientResult<(Vec<u8>, FileMetadata)> {
        within(timeout, self.open_inner(owner)).await
    }

    async fn open_inner(&self, owner: &Identity) -> ClientResult<(Vec<u8>, FileMetadata)> {
        let accessor = self.keys.identity();

        let reference = self.registry.get_record_reference(accessor, owner).await?;
        let grant = self.registry.get_wrapped_key(accessor, owner)?;
        let key = unwrap_symmetric_key(&grant.wrapped_key, &self.keys)?;

        let content_id = ContentId::parse(&reference)?;
        let buffer = self.blobs.get(&content_id).await?;
        let (plaintext, metadata) = unpack(&buffer, &key)?;

        tracing::info!(accessor = %accessor, owner = %owner, file = %metadata.file_name, "Record opened");
        Ok((plaintext, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct SlowBlobStore(MemoryBlobStore);

    impl BlobStore for SlowBlobStore {
        async fn put(&self, bytes: Vec<u8>) -> crate::storage::StoreResult<ContentId> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.0.put(bytes).await
        }

        async fn get(&self, id: &ContentId) -> crate::storage::StoreResult<Vec<u8>> {
            self.0.get(id).await
        }
    }

    fn setup() -> (
        PatientClient<MemoryBlobStore>,
        RecipientClient<MemoryBlobStore>,
    ) {
        let registry = Arc::new(Registry::in_memory());
        let blobs = Arc::new(MemoryBlobStore::new());
        (
            PatientClient::new(
                IdentityKeyPair::generate().unwrap(),
                registry.clone(),
                blobs.clone(),
            ),
            RecipientClient::new(IdentityKeyPair::generate().unwrap(), registry, blobs),
        )
    }

    fn descriptor() -> FileDescriptor {
        FileDescriptor::new("allergies.txt", "text/plain")
    }

    #[tokio::test]
    async fn recipient_opens_published_record() {
        let (patient, medic) = setup();
        medic.register().await.unwrap();

        patient
            .publish(b"penicillin", &descriptor(), &[medic.identity().clone()], TIMEOUT)
            .await
            .unwrap();

        let (plaintext, metadata) = medic.open(patient.identity(), TIMEOUT).await.unwrap();
        assert_eq!(plaintext, b"penicillin");
        assert_eq!(metadata.file_name, "allergies.txt");
        assert_eq!(metadata.file_size, 10);
    }

    #[tokio::test]
    async fn publish_fails_for_unregistered_recipient() {
        let (patient, medic) = setup();

        let err = patient
            .publish(b"data", &descriptor(), &[medic.identity().clone()], TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::PublicKeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn authorize_and_revoke_later() {
        let (patient, medic) = setup();
        medic.register().await.unwrap();

        let published = patient
            .publish(b"blood type O-", &descriptor(), &[], TIMEOUT)
            .await
            .unwrap();
        assert!(medic.open(patient.identity(), TIMEOUT).await.is_err());

        patient
            .authorize(medic.identity(), &published.key, None)
            .await
            .unwrap();
        let (plaintext, _) = medic.open(patient.identity(), TIMEOUT).await.unwrap();
        assert_eq!(plaintext, b"blood type O-");

        assert!(patient.revoke(medic.identity()).await.unwrap());
        let err = medic.open(patient.identity(), TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::AccessDenied { .. })
        ));
        assert_eq!(err.class(), ErrorClass::Authorization);
    }

    #[tokio::test]
    async fn slow_store_surfaces_timeout() {
        let registry = Arc::new(Registry::in_memory());
        let blobs = Arc::new(SlowBlobStore(MemoryBlobStore::new()));
        let patient = PatientClient::new(IdentityKeyPair::generate().unwrap(), registry, blobs);

        let err = patient
            .publish(b"data", &descriptor(), &[], Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
