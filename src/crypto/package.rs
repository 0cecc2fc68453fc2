// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record package framing.
//!
//! ```text
//! metadata_len[4, LE u32] || metadata_json[metadata_len] || ciphertext+tag[..]
//! ```
//!
//! The metadata is UTF-8 JSON with camelCase keys (`fileName`, `fileType`,
//! `fileSize`, `iv`, `encryptedAt`). The IV travels inside the metadata as
//! hex, so the package is self-contained apart from the symmetric key.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::{
    cipher::{self, SymmetricKey},
    CryptoError, CryptoResult,
};

/// Size of the little-endian metadata length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Caller-supplied description of the file being packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub file_name: String,
    /// MIME type.
    pub file_type: String,
}

impl FileDescriptor {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }
}

/// Metadata carried in front of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    pub file_type: String,
    /// Plaintext size in bytes.
    pub file_size: u64,
    /// Hex-encoded 12-byte IV.
    pub iv: String,
    /// ISO-8601 UTC with millisecond precision.
    #[serde(with = "iso8601_millis")]
    pub encrypted_at: DateTime<Utc>,
}

impl FileMetadata {
    /// The descriptor this metadata was built from.
    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor::new(&self.file_name, &self.file_type)
    }
}

mod iso8601_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A framed, encrypted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPackage {
    pub metadata: FileMetadata,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl RecordPackage {
    /// Serialize to the framed wire layout.
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        let metadata = serde_json::to_vec(&self.metadata)
            .map_err(|e| CryptoError::MalformedPackage(format!("metadata encoding failed: {e}")))?;
        let metadata_len = u32::try_from(metadata.len())
            .map_err(|_| CryptoError::MalformedPackage("metadata exceeds u32 length".to_string()))?;

        let mut out =
            Vec::with_capacity(LENGTH_PREFIX_SIZE + metadata.len() + self.ciphertext.len());
        out.extend_from_slice(&metadata_len.to_le_bytes());
        out.extend_from_slice(&metadata);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parse the framing without decrypting.
    pub fn from_bytes(buffer: &[u8]) -> CryptoResult<Self> {
        let prefix: [u8; LENGTH_PREFIX_SIZE] = buffer
            .get(..LENGTH_PREFIX_SIZE)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| {
                CryptoError::MalformedPackage(format!(
                    "buffer of {} bytes has no length prefix",
                    buffer.len()
                ))
            })?;
        let metadata_len = u32::from_le_bytes(prefix) as usize;

        let body = &buffer[LENGTH_PREFIX_SIZE..];
        if metadata_len > body.len() {
            return Err(CryptoError::MalformedPackage(format!(
                "metadata length {metadata_len} overflows remaining {} bytes",
                body.len()
            )));
        }

        let (metadata, ciphertext) = body.split_at(metadata_len);
        let metadata: FileMetadata = serde_json::from_slice(metadata)
            .map_err(|e| CryptoError::MalformedPackage(format!("invalid metadata: {e}")))?;

        Ok(Self {
            metadata,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt `plaintext` under `key` and frame it with its metadata.
///
/// `encrypted_at` is truncated to milliseconds so it survives the JSON
/// encoding unchanged.
pub fn pack(
    plaintext: &[u8],
    file: &FileDescriptor,
    key: &SymmetricKey,
    encrypted_at: DateTime<Utc>,
) -> CryptoResult<RecordPackage> {
    let (ciphertext, iv) = cipher::encrypt(plaintext, key)?;

    Ok(RecordPackage {
        metadata: FileMetadata {
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
            file_size: plaintext.len() as u64,
            iv: alloy::hex::encode(iv),
            encrypted_at: encrypted_at.trunc_subsecs(3),
        },
        ciphertext,
    })
}

/// Parse a framed buffer and decrypt it under `key`.
pub fn unpack(buffer: &[u8], key: &SymmetricKey) -> CryptoResult<(Vec<u8>, FileMetadata)> {
    let package = RecordPackage::from_bytes(buffer)?;

    let iv = alloy::hex::decode(&package.metadata.iv)
        .map_err(|e| CryptoError::MalformedPackage(format!("invalid iv hex: {e}")))?;
    let plaintext = cipher::decrypt(&package.ciphertext, key, &iv)?;

    if plaintext.len() as u64 != package.metadata.file_size {
        return Err(CryptoError::MalformedPackage(format!(
            "fileSize {} does not match decrypted length {}",
            package.metadata.file_size,
            plaintext.len()
        )));
    }

    Ok((plaintext, package.metadata))
}
