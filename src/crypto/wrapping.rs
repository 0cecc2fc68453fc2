// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECIES-style wrapping of a symmetric key for one recipient.
//!
//! ## Wrap
//!
//! 1. Generate an ephemeral secp256k1 key pair
//! 2. ECDH(ephemeral secret, recipient public) -> shared point
//! 3. wrapping key = SHA-256(x-coordinate of the shared point)
//! 4. AES-256-GCM encrypt the symmetric key under the wrapping key
//!
//! ## Unwrap
//!
//! ECDH(recipient secret, ephemeral public) yields the same x-coordinate,
//! so hashing it the same way yields the same wrapping key. Both paths go
//! through [`derive_wrapping_key`] so the KDF cannot drift between them.
//!
//! ## Layout
//!
//! ```text
//! [0, 33)   ephemeral public key (SEC1 compressed)
//! [33, 45)  IV
//! [45, ..)  ciphertext || tag
//! ```

use k256::{ecdh::diffie_hellman, PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use super::{
    cipher::{self, SymmetricKey, IV_SIZE, KEY_SIZE, TAG_SIZE},
    identity::{compress, parse_public_key, random_secret_key, IdentityKeyPair, COMPRESSED_KEY_SIZE},
    CryptoError, CryptoResult,
};

/// Size of the ephemeral public key prefix.
pub const EPHEMERAL_KEY_SIZE: usize = COMPRESSED_KEY_SIZE;

const IV_OFFSET: usize = EPHEMERAL_KEY_SIZE;
const CIPHERTEXT_OFFSET: usize = IV_OFFSET + IV_SIZE;

/// Smallest well-formed package: header plus an empty payload's tag.
pub const MIN_PACKAGE_SIZE: usize = CIPHERTEXT_OFFSET + TAG_SIZE;

/// A symmetric key wrapped for exactly one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKeyPackage {
    /// Ephemeral public key, compressed.
    pub ephemeral_public_key: [u8; EPHEMERAL_KEY_SIZE],
    /// IV used for the inner AEAD.
    pub iv: [u8; IV_SIZE],
    /// Wrapped key with authentication tag.
    pub ciphertext: Vec<u8>,
}

impl WrappedKeyPackage {
    /// Serialize to the fixed-offset wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CIPHERTEXT_OFFSET + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the fixed-offset wire layout.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < MIN_PACKAGE_SIZE {
            return Err(CryptoError::KeyRecovery(format!(
                "package too short: {} bytes, need at least {MIN_PACKAGE_SIZE}",
                bytes.len()
            )));
        }

        let mut ephemeral_public_key = [0u8; EPHEMERAL_KEY_SIZE];
        ephemeral_public_key.copy_from_slice(&bytes[..IV_OFFSET]);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[IV_OFFSET..CIPHERTEXT_OFFSET]);

        Ok(Self {
            ephemeral_public_key,
            iv,
            ciphertext: bytes[CIPHERTEXT_OFFSET..].to_vec(),
        })
    }
}

/// SHA-256 over the x-coordinate of the ECDH shared point.
fn derive_wrapping_key(secret: &SecretKey, public: &PublicKey) -> SymmetricKey {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let digest = Sha256::digest(shared.raw_secret_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    SymmetricKey::from_bytes(key)
}

/// Wrap `symmetric_key` so only the holder of `recipient`'s private key can
/// recover it.
pub fn wrap(symmetric_key: &[u8], recipient: &PublicKey) -> CryptoResult<WrappedKeyPackage> {
    let ephemeral = random_secret_key()?;
    let wrapping_key = derive_wrapping_key(&ephemeral, recipient);
    let (ciphertext, iv) = cipher::encrypt(symmetric_key, &wrapping_key)?;

    Ok(WrappedKeyPackage {
        ephemeral_public_key: compress(&ephemeral.public_key()),
        iv,
        ciphertext,
    })
}

/// Recover the symmetric key bytes from a serialized package.
///
/// Any failure (truncated package, bad ephemeral point, wrong recipient,
/// tampering) is reported as [`CryptoError::KeyRecovery`].
pub fn unwrap(package: &[u8], recipient: &IdentityKeyPair) -> CryptoResult<Vec<u8>> {
    let package = WrappedKeyPackage::from_bytes(package)?;

    let ephemeral = parse_public_key(&package.ephemeral_public_key)
        .map_err(|e| CryptoError::KeyRecovery(format!("bad ephemeral key: {e}")))?;

    let wrapping_key = derive_wrapping_key(recipient.secret_key(), &ephemeral);
    cipher::decrypt(&package.ciphertext, &wrapping_key, &package.iv).map_err(|_| {
        CryptoError::KeyRecovery(
            "authentication failed (wrong recipient, corrupted, or tampered package)".to_string(),
        )
    })
}

/// [`unwrap`], then check the result is a 256-bit key.
pub fn unwrap_symmetric_key(
    package: &[u8],
    recipient: &IdentityKeyPair,
) -> CryptoResult<SymmetricKey> {
    let bytes = unwrap(package, recipient)?;
    SymmetricKey::from_slice(&bytes)
        .map_err(|_| CryptoError::KeyRecovery(format!("unwrapped {} bytes, expected {KEY_SIZE}", bytes.len())))
}
