// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Emergency Access - Audited Key Release for Encrypted Patient Records
//!
//! Patients encrypt a record once, store the ciphertext in a content-addressed
//! blob store, and wrap the record key separately for each emergency
//! responder. The authorization registry decides who may fetch the record
//! reference and wrapped key, and logs every decision to a hash-chained audit
//! trail.
//!
//! ## Modules
//!
//! - `crypto` - AES-256-GCM records, ECDH key wrapping, package codec, identities
//! - `registry` - Authorization state machine and public key directory
//! - `audit` - Hash-chained, append-only audit log
//! - `storage` - Registry stores (memory, redb) and blob stores
//! - `client` - Patient and recipient workflows
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Signed-call authentication

pub mod api;
pub mod audit;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod registry;
pub mod state;
pub mod storage;
