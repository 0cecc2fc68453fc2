// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client-Side Cryptography
//!
//! Hybrid encryption for patient records. A record is encrypted once under a
//! random AES-256-GCM key, and that key is wrapped separately for every
//! recipient using secp256k1 ECDH, so the registry only ever stores opaque
//! bytes.
//!
//! ## Modules
//!
//! - `cipher` - AES-256-GCM with a fresh 96-bit IV per call
//! - `wrapping` - ECIES-style per-recipient key wrapping
//! - `package` - Binary framing of metadata + ciphertext
//! - `identity` - secp256k1 identity keys, addresses, call signatures
//!
//! ## Wire Formats
//!
//! ```text
//! WrappedKeyPackage: ephemeral_pubkey[33] || iv[12] || ciphertext+tag[n]
//! RecordPackage:     metadata_len[4, LE] || metadata_json[len] || ciphertext+tag[n]
//! ```
//!
//! Nothing in this module holds shared mutable state; every function is safe
//! to call concurrently.

pub mod cipher;
pub mod identity;
pub mod package;
pub mod wrapping;

pub use cipher::{decrypt, encrypt, generate_key, SymmetricKey, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub use identity::{address_of, parse_public_key, recover_signer, IdentityKeyPair};
pub use package::{pack, unpack, FileDescriptor, FileMetadata, RecordPackage};
pub use wrapping::{unwrap, unwrap_symmetric_key, wrap, WrappedKeyPackage, EPHEMERAL_KEY_SIZE};

use crate::error::ErrorClass;

/// Error type for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The OS random source could not produce bytes.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// AEAD tag did not verify, or the IV had the wrong length.
    #[error("authentication failed: ciphertext, key, or IV did not verify")]
    Authentication,

    /// A wrapped key could not be recovered for this recipient.
    #[error("key recovery failed: {0}")]
    KeyRecovery(String),

    /// A record package could not be parsed.
    #[error("malformed package: {0}")]
    MalformedPackage(String),

    /// Bytes are not a valid secp256k1 public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Private key or symmetric key material was rejected.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The AEAD refused to encrypt (plaintext too large).
    #[error("encryption failed")]
    Encryption,
}

impl CryptoError {
    /// Error class per the failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            CryptoError::EntropyUnavailable(_) => ErrorClass::Resource,
            CryptoError::MalformedPackage(_)
            | CryptoError::InvalidPublicKey(_)
            | CryptoError::InvalidKey(_) => ErrorClass::Input,
            CryptoError::Authentication | CryptoError::KeyRecovery(_) | CryptoError::Encryption => {
                ErrorClass::Crypto
            }
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
