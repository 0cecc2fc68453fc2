// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory registry store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    Mutation, PermissionEntry, PublicKeyEntry, RecordEntry, RegistryStore, StoreError, StoreResult,
};
use crate::models::Identity;

#[derive(Default)]
struct Tables {
    records: HashMap<Identity, RecordEntry>,
    permissions: HashMap<(Identity, Identity), PermissionEntry>,
    public_keys: HashMap<Identity, PublicKeyEntry>,
}

/// Registry state held in process memory.
///
/// One lock covers all three maps so an `apply` is observed entirely or not
/// at all.
#[derive(Default)]
pub struct MemoryRegistryStore {
    tables: RwLock<Tables>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn record(&self, owner: &Identity) -> StoreResult<Option<RecordEntry>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.records.get(owner).cloned())
    }

    fn permission(
        &self,
        owner: &Identity,
        recipient: &Identity,
    ) -> StoreResult<Option<PermissionEntry>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables
            .permissions
            .get(&(owner.clone(), recipient.clone()))
            .cloned())
    }

    fn public_key(&self, identity: &Identity) -> StoreResult<Option<PublicKeyEntry>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.public_keys.get(identity).cloned())
    }

    fn apply(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        for mutation in mutations {
            match mutation {
                Mutation::PutRecord(entry) => {
                    tables.records.insert(entry.owner.clone(), entry);
                }
                Mutation::ClearRecord { owner } => {
                    tables.records.remove(&owner);
                }
                Mutation::PutPermission(entry) => {
                    let key = (entry.owner.clone(), entry.recipient.clone());
                    tables.permissions.insert(key, entry);
                }
                Mutation::ClearPermission { owner, recipient } => {
                    tables.permissions.remove(&(owner, recipient));
                }
                Mutation::PutPublicKey(entry) => {
                    tables.public_keys.insert(entry.identity.clone(), entry);
                }
                Mutation::ClearPublicKey { identity } => {
                    tables.public_keys.remove(&identity);
                }
            }
        }
        Ok(())
    }
}
