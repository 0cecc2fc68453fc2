// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! The explicit store behind the authorization registry, plus the
//! content-addressed blob store that holds ciphertext.
//!
//! ## Registry Store
//!
//! The registry never touches a map or table directly. It reads through
//! [`RegistryStore`] point lookups and commits every state change as one
//! [`RegistryStore::apply`] call, which is atomic in every backend:
//!
//! - [`MemoryRegistryStore`] - single `RwLock` over three maps
//! - [`RedbRegistryStore`] - one redb write transaction per `apply`
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//!   registry.redb           # records, permissions, public_keys
//!   blobs/{sha256_hex}      # ciphertext, content-addressed
//!   audit/
//!     {date}/events.jsonl   # Daily hash-chained audit logs
//! ```

pub mod blobs;
pub mod memory;
pub mod paths;
pub mod registry_db;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ErrorClass, models::Identity};

pub use blobs::{BlobStore, ContentId, FsBlobStore, MemoryBlobStore};
pub use memory::MemoryRegistryStore;
pub use paths::StoragePaths;
pub use registry_db::RedbRegistryStore;

// =============================================================================
// Stored Entities
// =============================================================================

/// A patient's record pointer. Presence means the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub owner: Identity,
    pub content_reference: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A granted permission. Presence means `Granted`; revocation deletes the
/// entry, so the flag and the wrapped key can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub owner: Identity,
    pub recipient: Identity,
    pub wrapped_key: Vec<u8>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionEntry {
    /// Whether the grant is live at `now`. Grants without expiry never lapse.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| now < expiry)
    }
}

/// A published, address-verified public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    pub identity: Identity,
    /// 33-byte SEC1 compressed point.
    pub public_key: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

/// One state change, applied as part of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutRecord(RecordEntry),
    ClearRecord { owner: Identity },
    PutPermission(PermissionEntry),
    ClearPermission { owner: Identity, recipient: Identity },
    PutPublicKey(PublicKeyEntry),
    ClearPublicKey { identity: Identity },
}

// =============================================================================
// Store Trait
// =============================================================================

/// Backend for registry state.
pub trait RegistryStore: Send + Sync {
    fn record(&self, owner: &Identity) -> StoreResult<Option<RecordEntry>>;

    fn permission(
        &self,
        owner: &Identity,
        recipient: &Identity,
    ) -> StoreResult<Option<PermissionEntry>>;

    fn public_key(&self, identity: &Identity) -> StoreResult<Option<PublicKeyEntry>>;

    /// Apply all mutations or none of them.
    fn apply(&self, mutations: Vec<Mutation>) -> StoreResult<()>;
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::InvalidContentId(_) => ErrorClass::Input,
            StoreError::IntegrityViolation(_) => ErrorClass::Crypto,
            _ => ErrorClass::Resource,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
