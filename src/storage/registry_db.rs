// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent registry store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `records`: owner address → serialized RecordEntry
//! - `permissions`: composite key (owner|recipient) → serialized PermissionEntry
//! - `public_keys`: address → serialized PublicKeyEntry

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};
use serde::de::DeserializeOwned;

use super::{
    Mutation, PermissionEntry, PublicKeyEntry, RecordEntry, RegistryStore, StoreResult,
};
use crate::models::Identity;

// =============================================================================
// Table Definitions
// =============================================================================

/// owner address → RecordEntry (JSON bytes).
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// `owner|recipient` → PermissionEntry (JSON bytes).
const PERMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("permissions");

/// address → PublicKeyEntry (JSON bytes).
const PUBLIC_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("public_keys");

/// Build the composite key for the permissions table.
fn permission_key(owner: &Identity, recipient: &Identity) -> String {
    format!("{owner}|{recipient}")
}

// =============================================================================
// RedbRegistryStore
// =============================================================================

/// Embedded ACID registry store.
pub struct RedbRegistryStore {
    db: Database,
}

impl RedbRegistryStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(PERMISSIONS)?;
            let _ = write_txn.open_table(PUBLIC_KEYS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Opened registry database");
        Ok(Self { db })
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

impl RegistryStore for RedbRegistryStore {
    fn record(&self, owner: &Identity) -> StoreResult<Option<RecordEntry>> {
        self.get(RECORDS, owner.as_str())
    }

    fn permission(
        &self,
        owner: &Identity,
        recipient: &Identity,
    ) -> StoreResult<Option<PermissionEntry>> {
        self.get(PERMISSIONS, &permission_key(owner, recipient))
    }

    fn public_key(&self, identity: &Identity) -> StoreResult<Option<PublicKeyEntry>> {
        self.get(PUBLIC_KEYS, identity.as_str())
    }

    fn apply(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS)?;
            let mut permissions = write_txn.open_table(PERMISSIONS)?;
            let mut public_keys = write_txn.open_table(PUBLIC_KEYS)?;

            for mutation in &mutations {
                match mutation {
                    Mutation::PutRecord(entry) => {
                        let json = serde_json::to_vec(entry)?;
                        records.insert(entry.owner.as_str(), json.as_slice())?;
                    }
                    Mutation::ClearRecord { owner } => {
                        records.remove(owner.as_str())?;
                    }
                    Mutation::PutPermission(entry) => {
                        let key = permission_key(&entry.owner, &entry.recipient);
                        let json = serde_json::to_vec(entry)?;
                        permissions.insert(key.as_str(), json.as_slice())?;
                    }
                    Mutation::ClearPermission { owner, recipient } => {
                        let key = permission_key(owner, recipient);
                        permissions.remove(key.as_str())?;
                    }
                    Mutation::PutPublicKey(entry) => {
                        let json = serde_json::to_vec(entry)?;
                        public_keys.insert(entry.identity.as_str(), json.as_slice())?;
                    }
                    Mutation::ClearPublicKey { identity } => {
                        public_keys.remove(identity.as_str())?;
                    }
                }
            }
        }
        // Dropping an uncommitted write transaction aborts it, so an early
        // return above leaves the database untouched.
        write_txn.commit()?;

        tracing::debug!(mutations = mutations.len(), "Committed registry mutations");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_db() -> (RedbRegistryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = RedbRegistryStore::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn id(byte: u8) -> Identity {
        Identity::from_address_bytes(&[byte; 20])
    }

    fn grant(owner: u8, recipient: u8) -> PermissionEntry {
        PermissionEntry {
            owner: id(owner),
            recipient: id(recipient),
            wrapped_key: vec![0xAB; 61],
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn put_and_get_record() {
        let (db, _dir) = temp_db();
        let entry = RecordEntry {
            owner: id(1),
            content_reference: "sha256:beef".to_string(),
            uploaded_at: Utc::now(),
        };
        db.apply(vec![Mutation::PutRecord(entry.clone())]).unwrap();

        assert_eq!(db.record(&id(1)).unwrap(), Some(entry));
        assert_eq!(db.record(&id(2)).unwrap(), None);
    }

    #[test]
    fn permissions_are_keyed_by_pair() {
        let (db, _dir) = temp_db();
        db.apply(vec![
            Mutation::PutPermission(grant(1, 2)),
            Mutation::PutPermission(grant(1, 3)),
        ])
        .unwrap();

        assert!(db.permission(&id(1), &id(2)).unwrap().is_some());
        assert!(db.permission(&id(1), &id(3)).unwrap().is_some());
        assert!(db.permission(&id(2), &id(1)).unwrap().is_none());

        db.apply(vec![Mutation::ClearPermission {
            owner: id(1),
            recipient: id(2),
        }])
        .unwrap();
        assert!(db.permission(&id(1), &id(2)).unwrap().is_none());
        assert!(db.permission(&id(1), &id(3)).unwrap().is_some());
    }

    #[test]
    fn public_keys_round_trip() {
        let (db, _dir) = temp_db();
        let entry = PublicKeyEntry {
            identity: id(9),
            public_key: vec![0x02; 33],
            published_at: Utc::now(),
        };
        db.apply(vec![Mutation::PutPublicKey(entry.clone())]).unwrap();
        assert_eq!(db.public_key(&id(9)).unwrap(), Some(entry));

        db.apply(vec![Mutation::ClearPublicKey { identity: id(9) }])
            .unwrap();
        assert_eq!(db.public_key(&id(9)).unwrap(), None);
    }

    #[test]
    fn clear_record_removes_entry() {
        let (db, _dir) = temp_db();
        db.apply(vec![Mutation::PutRecord(RecordEntry {
            owner: id(1),
            content_reference: "sha256:beef".to_string(),
            uploaded_at: Utc::now(),
        })])
        .unwrap();

        db.apply(vec![Mutation::ClearRecord { owner: id(1) }]).unwrap();
        assert_eq!(db.record(&id(1)).unwrap(), None);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.redb");
        {
            let db = RedbRegistryStore::open(&path).unwrap();
            db.apply(vec![Mutation::PutPermission(grant(4, 5))]).unwrap();
        }

        let reopened = RedbRegistryStore::open(&path).unwrap();
        let entry = reopened.permission(&id(4), &id(5)).unwrap().unwrap();
        assert_eq!(entry.wrapped_key.len(), 61);
    }
}
