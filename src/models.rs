// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API, plus the [`Identity`] type
//! every layer uses to name a participant. All HTTP types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for JSON handling and OpenAPI documentation.
//!
//! Binary payloads (wrapped keys, public keys) travel as lowercase hex
//! strings without a `0x` prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::audit::AuditRecord;

// =============================================================================
// Identity
// =============================================================================

/// Length of an address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// A participant, named by the EVM address of their secp256k1 key.
///
/// Always stored normalized: `0x` followed by 40 lowercase hex characters.
/// The zero address is the "null" identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf")]
pub struct Identity(String);

/// Rejected identity string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identity '{0}': expected 0x followed by 40 hex characters")]
pub struct InvalidIdentity(pub String);

impl Identity {
    /// Parse and normalize an address string. The `0x` prefix is required;
    /// hex case is ignored.
    pub fn parse(value: &str) -> Result<Self, InvalidIdentity> {
        let hex_part = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| InvalidIdentity(value.to_string()))?;

        if hex_part.len() != ADDRESS_SIZE * 2 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidIdentity(value.to_string()));
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    /// Identity for raw address bytes.
    pub fn from_address_bytes(bytes: &[u8; ADDRESS_SIZE]) -> Self {
        Self(format!("0x{}", alloy::hex::encode(bytes)))
    }

    /// The null identity (`0x000...0`).
    pub fn zero() -> Self {
        Self::from_address_bytes(&[0u8; ADDRESS_SIZE])
    }

    /// Whether this is the null identity.
    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = InvalidIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = InvalidIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

// =============================================================================
// Record Models
// =============================================================================

/// Request to register (or replace) the caller's record reference.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadRecordRequest {
    /// Opaque locator of the ciphertext in the blob store.
    pub content_reference: String,
}

/// A record reference released to an authorized accessor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RecordReferenceResponse {
    pub owner: Identity,
    pub content_reference: String,
}

/// A wrapped key released to its recipient.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WrappedKeyResponse {
    pub owner: Identity,
    /// Hex-encoded wrapped key package.
    pub wrapped_key: String,
    /// When the grant lapses, if it does.
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Grant Models
// =============================================================================

/// Request to grant one recipient access to the caller's record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GrantAccessRequest {
    pub recipient: Identity,
    /// Hex-encoded wrapped key package for this recipient.
    pub wrapped_key: String,
    /// Optional expiry; must be in the future.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to grant several recipients in one all-or-nothing call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchGrantAccessRequest {
    pub recipients: Vec<Identity>,
    /// Hex-encoded wrapped keys, aligned with `recipients`.
    pub wrapped_keys: Vec<String>,
    /// Optional expiry applied to every grant in the batch.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to revoke several recipients in one all-or-nothing call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchRevokeAccessRequest {
    pub recipients: Vec<Identity>,
}

/// Recipients whose grants were actually cleared. Pairs with no grant are
/// left out, so a repeated revoke returns an empty list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RevokeAccessResponse {
    pub revoked: Vec<Identity>,
}

/// Result of a pure access check.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccessCheckResponse {
    pub owner: Identity,
    pub accessor: Identity,
    pub granted: bool,
}

// =============================================================================
// Key Directory Models
// =============================================================================

/// Request to publish the caller's compressed public key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublishPublicKeyRequest {
    /// Hex-encoded 33-byte SEC1 compressed secp256k1 point.
    pub public_key: String,
}

/// A published public key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PublicKeyResponse {
    pub identity: Identity,
    /// Hex-encoded 33-byte compressed point.
    pub public_key: String,
}

// =============================================================================
// Audit Models
// =============================================================================

/// Filters for the audit query endpoint. All are optional and combine with AND.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    /// Only events naming this identity as owner, recipient, or accessor.
    pub entity: Option<Identity>,
}

/// Audit entries matching a query, in append order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditListResponse {
    pub records: Vec<AuditRecord>,
    pub total: usize,
}

/// Outcome of a full chain verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ChainStatusResponse {
    pub valid: bool,
    pub length: u64,
    /// Hash of the last entry (64 zeros when empty).
    pub head_hash: String,
    /// First sequence number whose hash or link does not verify.
    pub broken_at: Option<u64>,
}
