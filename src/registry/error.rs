// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registry errors.

use crate::{audit::AuditError, error::ErrorClass, models::Identity, storage::StoreError};

/// Every way a registry call can fail.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required field was empty (reference, wrapped key, batch).
    #[error("empty input: {0} must not be empty")]
    EmptyInput(&'static str),

    /// Recipient is the null identity or the caller themself.
    #[error("invalid recipient {recipient}: {reason}")]
    InvalidRecipient {
        recipient: Identity,
        reason: &'static str,
    },

    /// Grant expiry is not in the future.
    #[error("expiry must be in the future")]
    InvalidExpiry,

    /// Published key is malformed or does not belong to the caller.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// `recipients` and `wrapped_keys` differ in length.
    #[error("batch length mismatch: {recipients} recipients, {wrapped_keys} wrapped keys")]
    BatchLengthMismatch {
        recipients: usize,
        wrapped_keys: usize,
    },

    /// One element of a batch failed; nothing in the batch was applied.
    #[error("batch item {index} rejected: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<RegistryError>,
    },

    /// The owner has never uploaded a record.
    #[error("no record registered for {0}")]
    RecordNotFound(Identity),

    /// The caller tried to change a record keyed to someone else. Registry
    /// mutations are keyed by the signed caller, so no registry call returns
    /// this today; it is part of the stable error surface.
    #[error("{caller} does not own the record of {owner}")]
    NotOwner { caller: Identity, owner: Identity },

    /// The accessor holds no live grant from the owner.
    #[error("{accessor} has no access to the record of {owner}")]
    AccessDenied { accessor: Identity, owner: Identity },

    /// No key has been published for this identity.
    #[error("no public key published for {0}")]
    PublicKeyNotFound(Identity),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::EmptyInput(_)
            | RegistryError::InvalidRecipient { .. }
            | RegistryError::InvalidExpiry
            | RegistryError::InvalidPublicKey(_)
            | RegistryError::BatchLengthMismatch { .. } => ErrorClass::Input,
            RegistryError::BatchItem { source, .. } => source.class(),
            RegistryError::RecordNotFound(_)
            | RegistryError::NotOwner { .. }
            | RegistryError::AccessDenied { .. }
            | RegistryError::PublicKeyNotFound(_) => ErrorClass::Authorization,
            RegistryError::Store(e) => e.class(),
            RegistryError::Audit(e) => e.class(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::EmptyInput(_) => "empty_input",
            RegistryError::InvalidRecipient { .. } => "invalid_recipient",
            RegistryError::InvalidExpiry => "invalid_expiry",
            RegistryError::InvalidPublicKey(_) => "invalid_public_key",
            RegistryError::BatchLengthMismatch { .. } => "batch_length_mismatch",
            RegistryError::BatchItem { source, .. } => source.error_code(),
            RegistryError::RecordNotFound(_) => "record_not_found",
            RegistryError::NotOwner { .. } => "not_owner",
            RegistryError::AccessDenied { .. } => "access_denied",
            RegistryError::PublicKeyNotFound(_) => "public_key_not_found",
            RegistryError::Store(_) => "storage_error",
            RegistryError::Audit(_) => "audit_error",
        }
    }

    /// Attach the position of a failing batch element.
    pub(crate) fn at_index(self, index: usize) -> Self {
        RegistryError::BatchItem {
            index,
            source: Box::new(self),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
