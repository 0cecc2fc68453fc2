// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Signed-call authentication for the registry API. There are no sessions or
//! bearer tokens: every protected request carries a secp256k1 signature over
//! its own method, path, timestamp, and body hash.
//!
//! ## Auth Flow
//!
//! 1. Client builds the message
//!    `"{METHOD}\n{PATH_AND_QUERY}\n{TIMESTAMP}\n{hex(sha256(body))}"`
//! 2. Client signs it EIP-191 style with its identity key
//! 3. Client sends `x-identity`, `x-timestamp`, `x-signature`
//! 4. Server:
//!    - Checks the timestamp is within 60 seconds of its clock
//!    - Recovers the signer from the signature
//!    - Requires the signer to equal `x-identity`
//!
//! The recovered identity is the `caller` of the registry operation.

pub mod error;
pub mod extractor;

use sha2::{Digest, Sha256};

use crate::crypto::{CryptoResult, IdentityKeyPair};

pub use error::AuthError;
pub use extractor::{Caller, Signed};

pub const IDENTITY_HEADER: &str = "x-identity";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// The exact bytes a caller signs for one request.
pub fn signing_message(method: &str, path_and_query: &str, timestamp: i64, body: &[u8]) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path_and_query,
        timestamp,
        alloy::hex::encode(Sha256::digest(body))
    )
}

/// Sign a request, returning the hex value for `x-signature`.
pub fn sign_call(
    keys: &IdentityKeyPair,
    method: &str,
    path_and_query: &str,
    timestamp: i64,
    body: &[u8],
) -> CryptoResult<String> {
    let message = signing_message(method, path_and_query, timestamp, body);
    Ok(alloy::hex::encode(keys.sign_message(message.as_bytes())?))
}
