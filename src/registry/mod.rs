// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Registry
//!
//! Owns per-patient record pointers, per-(owner, recipient) grants with their
//! wrapped keys, and the public key directory. Decides who may read what.
//!
//! ## State Machine
//!
//! Each `(owner, recipient)` pair is `NoAccess` or `Granted`. A grant moves it
//! to `Granted` and stores the wrapped key; a revoke deletes both together.
//! Revoking a pair that is already `NoAccess` is a silent no-op with no event.
//! A grant past its expiry reads as `NoAccess` but is still stored, so
//! revoking it still emits an event.
//!
//! ## Concurrency
//!
//! Every call that appends to the audit log holds one async writer lock
//! across its state reads, its [`RegistryStore::apply`], and its audit
//! append, so the chain order matches the order state changed in. That
//! includes `get_record_reference`. Unaudited reads (`check_access`,
//! `get_wrapped_key`, key lookups) never take the lock.
//!
//! If the audit append fails, the store mutation is undone before the error
//! is returned: a call either changes state and logs it, or does neither.
//!
//! ## Audit
//!
//! | Operation | Event |
//! |-----------|-------|
//! | `upload_record` | `Uploaded` |
//! | `grant_access` / `batch_grant_access` | `PermissionChanged{granted=true}` per element |
//! | `revoke_access` / `batch_revoke_access` | `PermissionChanged{granted=false}` per pair that was granted |
//! | `get_record_reference` | `AccessAttempted`, always, even on denial |
//! | `get_wrapped_key`, `check_access`, key directory | none |

pub mod error;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    audit::{AuditEvent, AuditLog},
    clock::{Clock, SystemClock},
    crypto::{address_of, identity::compress, parse_public_key},
    models::Identity,
    storage::{
        MemoryRegistryStore, Mutation, PermissionEntry, PublicKeyEntry, RecordEntry,
        RedbRegistryStore, RegistryStore, StoragePaths,
    },
};

pub use error::{RegistryError, RegistryResult};

/// The authorization registry.
pub struct Registry {
    store: Arc<dyn RegistryStore>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
}

impl Registry {
    pub fn new(store: Arc<dyn RegistryStore>, audit: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            audit,
            clock,
            writer: Mutex::new(()),
        }
    }

    /// Registry with in-memory state and audit log, on system time.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRegistryStore::new()),
            Arc::new(AuditLog::in_memory()),
            Arc::new(SystemClock),
        )
    }

    /// Persistent registry under `paths`: the redb store plus the replayed,
    /// verified JSONL audit log.
    pub fn open(paths: &StoragePaths, clock: Arc<dyn Clock>) -> RegistryResult<Self> {
        let store = RedbRegistryStore::open(&paths.registry_db())?;
        let audit = AuditLog::open(paths.clone())?;
        Ok(Self::new(Arc::new(store), Arc::new(audit), clock))
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Register or replace the caller's record reference.
    pub async fn upload_record(
        &self,
        caller: &Identity,
        content_reference: &str,
    ) -> RegistryResult<()> {
        if content_reference.trim().is_empty() {
            return Err(RegistryError::EmptyInput("content_reference"));
        }

        let _guard = self.writer.lock().await;
        let now = self.clock.now();

        self.commit(
            vec![Mutation::PutRecord(RecordEntry {
                owner: caller.clone(),
                content_reference: content_reference.to_string(),
                uploaded_at: now,
            })],
            vec![AuditEvent::Uploaded {
                owner: caller.clone(),
                content_reference: content_reference.to_string(),
                timestamp: now,
            }],
        )?;

        tracing::info!(owner = %caller, "Record uploaded");
        Ok(())
    }

    /// Release `owner`'s record reference to `accessor`.
    ///
    /// Always appends exactly one `AccessAttempted` event before returning,
    /// whatever the outcome.
    pub async fn get_record_reference(
        &self,
        accessor: &Identity,
        owner: &Identity,
    ) -> RegistryResult<String> {
        let _guard = self.writer.lock().await;
        let now = self.clock.now();
        let authorized = self.is_authorized(owner, accessor, now)?;
        let record = self.store.record(owner)?;
        let success = authorized && record.is_some();

        self.audit.append(AuditEvent::AccessAttempted {
            accessor: accessor.clone(),
            owner: owner.clone(),
            success,
            timestamp: now,
        })?;

        if !authorized {
            tracing::warn!(accessor = %accessor, owner = %owner, "Record access denied");
            return Err(RegistryError::AccessDenied {
                accessor: accessor.clone(),
                owner: owner.clone(),
            });
        }

        match record {
            Some(record) => {
                tracing::info!(accessor = %accessor, owner = %owner, "Record reference released");
                Ok(record.content_reference)
            }
            None => Err(RegistryError::RecordNotFound(owner.clone())),
        }
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Grant `recipient` access to the caller's record with a wrapped key.
    pub async fn grant_access(
        &self,
        caller: &Identity,
        recipient: &Identity,
        wrapped_key: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> RegistryResult<()> {
        let _guard = self.writer.lock().await;
        let now = self.clock.now();

        self.require_record(caller)?;
        validate_grant(caller, recipient, &wrapped_key, expires_at, now)?;

        self.commit_grants(caller, vec![(recipient.clone(), wrapped_key)], expires_at, now)
    }

    /// Grant several recipients at once. All elements are validated before
    /// anything is written; one bad element rejects the whole batch.
    pub async fn batch_grant_access(
        &self,
        caller: &Identity,
        recipients: Vec<Identity>,
        wrapped_keys: Vec<Vec<u8>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> RegistryResult<()> {
        if recipients.is_empty() {
            return Err(RegistryError::EmptyInput("recipients"));
        }
        if recipients.len() != wrapped_keys.len() {
            return Err(RegistryError::BatchLengthMismatch {
                recipients: recipients.len(),
                wrapped_keys: wrapped_keys.len(),
            });
        }

        let _guard = self.writer.lock().await;
        let now = self.clock.now();

        self.require_record(caller)?;
        for (index, (recipient, wrapped_key)) in recipients.iter().zip(&wrapped_keys).enumerate() {
            validate_grant(caller, recipient, wrapped_key, expires_at, now)
                .map_err(|e| e.at_index(index))?;
        }

        self.commit_grants(
            caller,
            recipients.into_iter().zip(wrapped_keys).collect(),
            expires_at,
            now,
        )
    }

    fn commit_grants(
        &self,
        caller: &Identity,
        grants: Vec<(Identity, Vec<u8>)>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RegistryResult<()> {
        let mut mutations = Vec::with_capacity(grants.len());
        let mut events = Vec::with_capacity(grants.len());

        for (recipient, wrapped_key) in grants {
            events.push(AuditEvent::PermissionChanged {
                owner: caller.clone(),
                recipient: recipient.clone(),
                granted: true,
                timestamp: now,
            });
            mutations.push(Mutation::PutPermission(PermissionEntry {
                owner: caller.clone(),
                recipient,
                wrapped_key,
                granted_at: now,
                expires_at,
            }));
        }

        let count = mutations.len();
        self.commit(mutations, events)?;

        tracing::info!(owner = %caller, grants = count, expires_at = ?expires_at, "Access granted");
        Ok(())
    }

    /// Revoke `recipient`'s access. Returns `false` (and records nothing) if
    /// there was no grant to revoke.
    pub async fn revoke_access(
        &self,
        caller: &Identity,
        recipient: &Identity,
    ) -> RegistryResult<bool> {
        let revoked = self
            .batch_revoke_access(caller, std::slice::from_ref(recipient))
            .await?;
        Ok(!revoked.is_empty())
    }

    /// Revoke several recipients at once. Pairs that are already `NoAccess`
    /// are skipped without an event. Returns the recipients actually revoked.
    pub async fn batch_revoke_access(
        &self,
        caller: &Identity,
        recipients: &[Identity],
    ) -> RegistryResult<Vec<Identity>> {
        if recipients.is_empty() {
            return Err(RegistryError::EmptyInput("recipients"));
        }

        let _guard = self.writer.lock().await;
        let now = self.clock.now();
        self.require_record(caller)?;

        let mut seen = HashSet::new();
        let mut revoked = Vec::new();
        for recipient in recipients {
            if !seen.insert(recipient) {
                continue;
            }
            if self.store.permission(caller, recipient)?.is_some() {
                revoked.push(recipient.clone());
            }
        }

        if revoked.is_empty() {
            tracing::debug!(owner = %caller, "Revoke was a no-op");
            return Ok(revoked);
        }

        let mutations = revoked
            .iter()
            .map(|recipient| Mutation::ClearPermission {
                owner: caller.clone(),
                recipient: recipient.clone(),
            })
            .collect();
        let events = revoked
            .iter()
            .map(|recipient| AuditEvent::PermissionChanged {
                owner: caller.clone(),
                recipient: recipient.clone(),
                granted: false,
                timestamp: now,
            })
            .collect();

        self.commit(mutations, events)?;

        tracing::info!(owner = %caller, revoked = revoked.len(), "Access revoked");
        Ok(revoked)
    }

    /// The live grant held by `accessor`, including its wrapped key.
    /// Not audited.
    pub fn get_wrapped_key(
        &self,
        accessor: &Identity,
        owner: &Identity,
    ) -> RegistryResult<PermissionEntry> {
        let now = self.clock.now();
        self.store
            .permission(owner, accessor)?
            .filter(|entry| entry.is_active(now))
            .ok_or_else(|| RegistryError::AccessDenied {
                accessor: accessor.clone(),
                owner: owner.clone(),
            })
    }

    /// Whether `accessor` may read `owner`'s record. Pure predicate.
    pub fn check_access(&self, owner: &Identity, accessor: &Identity) -> RegistryResult<bool> {
        self.is_authorized(owner, accessor, self.clock.now())
    }

    // =========================================================================
    // Public Key Directory
    // =========================================================================

    /// Publish the caller's compressed public key. The key must hash to the
    /// caller's address.
    pub async fn publish_public_key(
        &self,
        caller: &Identity,
        public_key: &[u8],
    ) -> RegistryResult<()> {
        let key = parse_public_key(public_key)
            .map_err(|e| RegistryError::InvalidPublicKey(e.to_string()))?;

        let derived = address_of(&key);
        if &derived != caller {
            return Err(RegistryError::InvalidPublicKey(format!(
                "key belongs to {derived}, not {caller}"
            )));
        }

        let _guard = self.writer.lock().await;
        self.store.apply(vec![Mutation::PutPublicKey(PublicKeyEntry {
            identity: caller.clone(),
            public_key: compress(&key).to_vec(),
            published_at: self.clock.now(),
        })])?;

        tracing::info!(identity = %caller, "Public key published");
        Ok(())
    }

    pub fn get_public_key(&self, identity: &Identity) -> RegistryResult<PublicKeyEntry> {
        self.store
            .public_key(identity)?
            .ok_or_else(|| RegistryError::PublicKeyNotFound(identity.clone()))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Records are keyed by owner, so looking one up under `caller` is also
    /// the ownership check.
    fn require_record(&self, caller: &Identity) -> RegistryResult<RecordEntry> {
        self.store
            .record(caller)?
            .ok_or_else(|| RegistryError::RecordNotFound(caller.clone()))
    }

    /// Apply `mutations` and append `events`. Must be called with the writer
    /// lock held. A failed append puts the store back as it was.
    fn commit(&self, mutations: Vec<Mutation>, events: Vec<AuditEvent>) -> RegistryResult<()> {
        let undo = self.undo_for(&mutations)?;
        self.store.apply(mutations)?;

        if let Err(e) = self.audit.append_all(events) {
            if let Err(undo_err) = self.store.apply(undo) {
                tracing::error!(
                    error = %undo_err,
                    audit_error = %e,
                    "Failed to roll back registry state after audit failure"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Mutations that restore the current state of everything `mutations`
    /// touches, in reverse order.
    fn undo_for(&self, mutations: &[Mutation]) -> RegistryResult<Vec<Mutation>> {
        let mut undo = Vec::with_capacity(mutations.len());
        for mutation in mutations.iter().rev() {
            let restore = match mutation {
                Mutation::PutRecord(RecordEntry { owner, .. })
                | Mutation::ClearRecord { owner } => match self.store.record(owner)? {
                    Some(previous) => Mutation::PutRecord(previous),
                    None => Mutation::ClearRecord {
                        owner: owner.clone(),
                    },
                },
                Mutation::PutPermission(PermissionEntry {
                    owner, recipient, ..
                })
                | Mutation::ClearPermission { owner, recipient } => {
                    match self.store.permission(owner, recipient)? {
                        Some(previous) => Mutation::PutPermission(previous),
                        None => Mutation::ClearPermission {
                            owner: owner.clone(),
                            recipient: recipient.clone(),
                        },
                    }
                }
                Mutation::PutPublicKey(PublicKeyEntry { identity, .. })
                | Mutation::ClearPublicKey { identity } => {
                    match self.store.public_key(identity)? {
                        Some(previous) => Mutation::PutPublicKey(previous),
                        None => Mutation::ClearPublicKey {
                            identity: identity.clone(),
                        },
                    }
                }
            };
            undo.push(restore);
        }
        Ok(undo)
    }

    fn is_authorized(
        &self,
        owner: &Identity,
        accessor: &Identity,
        now: DateTime<Utc>,
    ) -> RegistryResult<bool> {
        if accessor == owner {
            return Ok(true);
        }
        Ok(self
            .store
            .permission(owner, accessor)?
            .is_some_and(|entry| entry.is_active(now)))
    }
}

/// Per-element grant preconditions.
fn validate_grant(
    caller: &Identity,
    recipient: &Identity,
    wrapped_key: &[u8],
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> RegistryResult<()> {
    if recipient.is_zero() {
        return Err(RegistryError::InvalidRecipient {
            recipient: recipient.clone(),
            reason: "null identity",
        });
    }
    if recipient == caller {
        return Err(RegistryError::InvalidRecipient {
            recipient: recipient.clone(),
            reason: "owner always has access to their own record",
        });
    }
    if wrapped_key.is_empty() {
        return Err(RegistryError::EmptyInput("wrapped_key"));
    }
    if expires_at.is_some_and(|expiry| expiry <= now) {
        return Err(RegistryError::InvalidExpiry);
    }
    Ok(())
}
