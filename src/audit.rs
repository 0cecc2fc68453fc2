// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Audit Emitter
//!
//! Append-only, hash-chained log of every upload, permission change, and
//! access attempt the registry sees.
//!
//! ## Chain
//!
//! Each [`AuditRecord`] commits to its predecessor:
//!
//! ```text
//! hash = SHA-256(sequence_be_u64 || prev_hash || json(event))
//! ```
//!
//! The first record links to [`GENESIS_HASH`]. Editing, dropping, or
//! reordering any record breaks every hash after it, which
//! [`AuditLog::verify_chain`] reports as [`AuditError::ChainBroken`].
//!
//! ## Persistence
//!
//! With a data directory, records are also appended to
//! `audit/{date}/events.jsonl` (one JSON object per line, dated by the event
//! timestamp). On open every day file is replayed and the chain is verified
//! before the log accepts new entries. There is no compaction or deletion.
//!
//! A failed append truncates every file it touched back to its previous
//! length, so the files always hold exactly the in-memory chain. If that
//! truncation fails too, the log refuses further appends until it is
//! reopened and replayed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::ErrorClass, models::Identity, storage::StoragePaths};

/// `prev_hash` of the first record: 64 hex zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// =============================================================================
// Events
// =============================================================================

/// Something the registry did or refused to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A record reference was registered or replaced.
    Uploaded {
        owner: Identity,
        content_reference: String,
        timestamp: DateTime<Utc>,
    },
    /// A grant was created (`granted = true`) or revoked (`granted = false`).
    PermissionChanged {
        owner: Identity,
        recipient: Identity,
        granted: bool,
        timestamp: DateTime<Utc>,
    },
    /// Someone asked for a record reference.
    AccessAttempted {
        accessor: Identity,
        owner: Identity,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::Uploaded { timestamp, .. }
            | AuditEvent::PermissionChanged { timestamp, .. }
            | AuditEvent::AccessAttempted { timestamp, .. } => *timestamp,
        }
    }

    /// Whether `identity` appears as owner, recipient, or accessor.
    pub fn involves(&self, identity: &Identity) -> bool {
        match self {
            AuditEvent::Uploaded { owner, .. } => owner == identity,
            AuditEvent::PermissionChanged {
                owner, recipient, ..
            } => owner == identity || recipient == identity,
            AuditEvent::AccessAttempted {
                accessor, owner, ..
            } => accessor == identity || owner == identity,
        }
    }
}

/// An event at its position in the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AuditRecord {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub event_id: Uuid,
    pub event: AuditEvent,
    /// Hash of the previous record, or [`GENESIS_HASH`].
    pub prev_hash: String,
    pub hash: String,
}

/// Hash of one chain link.
pub fn compute_hash(sequence: u64, prev_hash: &str, event: &AuditEvent) -> AuditResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(serde_json::to_vec(event)?);
    Ok(alloy::hex::encode(hasher.finalize()))
}

/// Build the record that follows the last entry of `chain`.
fn next_record(chain: &[AuditRecord], sequence: u64, event: AuditEvent) -> AuditResult<AuditRecord> {
    let prev_hash = chain
        .last()
        .map(|r| r.hash.clone())
        .unwrap_or_else(|| GENESIS_HASH.to_string());
    let hash = compute_hash(sequence, &prev_hash, &event)?;
    Ok(AuditRecord {
        sequence,
        event_id: Uuid::new_v4(),
        event,
        prev_hash,
        hash,
    })
}

/// Check sequence numbering, links, and hashes of a whole chain.
pub fn verify_records(records: &[AuditRecord]) -> AuditResult<()> {
    let mut prev_hash = GENESIS_HASH;
    for (index, record) in records.iter().enumerate() {
        let sequence = index as u64;
        if record.sequence != sequence
            || record.prev_hash != prev_hash
            || record.hash != compute_hash(record.sequence, &record.prev_hash, &record.event)?
        {
            return Err(AuditError::ChainBroken { sequence });
        }
        prev_hash = &record.hash;
    }
    Ok(())
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("audit chain broken at sequence {sequence}")]
    ChainBroken { sequence: u64 },

    #[error("audit log lock poisoned")]
    LockPoisoned,

    #[error("audit files out of sync with the in-memory chain; reopen the log")]
    OutOfSync,
}

impl AuditError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuditError::ChainBroken { .. } => ErrorClass::Crypto,
            _ => ErrorClass::Resource,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

// =============================================================================
// JSONL Persistence
// =============================================================================

/// Appends records to daily JSONL files.
struct JsonlSink {
    paths: StoragePaths,
}

impl JsonlSink {
    /// Append `records` to their day files. On failure every touched file is
    /// cut back to its length before the call.
    fn write(&self, records: &[AuditRecord]) -> AuditResult<()> {
        let mut touched: Vec<(PathBuf, u64)> = Vec::new();
        let Err(err) = self.write_lines(records, &mut touched) else {
            return Ok(());
        };

        for (path, len) in touched.iter().rev() {
            let truncated = OpenOptions::new()
                .write(true)
                .open(path)
                .and_then(|file| file.set_len(*len).and_then(|()| file.sync_data()));
            if let Err(undo) = truncated {
                tracing::error!(
                    path = %path.display(),
                    error = %undo,
                    "Failed to roll back partial audit append"
                );
                return Err(AuditError::OutOfSync);
            }
        }
        Err(err)
    }

    fn write_lines(
        &self,
        records: &[AuditRecord],
        touched: &mut Vec<(PathBuf, u64)>,
    ) -> AuditResult<()> {
        for record in records {
            let date = record.event.timestamp().format("%Y-%m-%d").to_string();
            fs::create_dir_all(self.paths.audit_date_dir(&date))?;

            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');

            let path = self.paths.audit_events_file(&date);
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            if !touched.iter().any(|(p, _)| *p == path) {
                touched.push((path, file.metadata()?.len()));
            }
            file.write_all(&line)?;
            file.sync_data()?;
        }
        Ok(())
    }

    /// Read every day file, in date order, then order by sequence.
    fn replay(&self) -> AuditResult<Vec<AuditRecord>> {
        let audit_dir = self.paths.audit_dir();
        if !audit_dir.exists() {
            return Ok(Vec::new());
        }

        let mut dates: Vec<NaiveDate> = fs::read_dir(&audit_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .filter_map(|name| NaiveDate::parse_from_str(&name, "%Y-%m-%d").ok())
            .collect();
        dates.sort();

        let mut records = Vec::new();
        for date in dates {
            let path = self
                .paths
                .audit_events_file(&date.format("%Y-%m-%d").to_string());
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                records.push(serde_json::from_str::<AuditRecord>(line)?);
            }
        }

        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }
}

// =============================================================================
// AuditLog
// =============================================================================

/// The audit trail. Cheap to query, append-only to write.
pub struct AuditLog {
    records: RwLock<Vec<AuditRecord>>,
    sink: Option<JsonlSink>,
    out_of_sync: AtomicBool,
}

impl AuditLog {
    /// A log that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sink: None,
            out_of_sync: AtomicBool::new(false),
        }
    }

    /// Open the persistent log under `paths`, replaying and verifying it.
    pub fn open(paths: StoragePaths) -> AuditResult<Self> {
        let sink = JsonlSink { paths };
        let records = sink.replay()?;
        verify_records(&records)?;

        tracing::info!(records = records.len(), "Replayed audit log");
        Ok(Self {
            records: RwLock::new(records),
            sink: Some(sink),
            out_of_sync: AtomicBool::new(false),
        })
    }

    /// Append one event.
    pub fn append(&self, event: AuditEvent) -> AuditResult<AuditRecord> {
        let mut records = self.records.write().map_err(|_| AuditError::LockPoisoned)?;
        let record = next_record(&records, records.len() as u64, event)?;
        self.commit(&mut records, std::slice::from_ref(&record))?;
        Ok(record)
    }

    /// Append several events in order, all under one lock.
    pub fn append_all(&self, events: Vec<AuditEvent>) -> AuditResult<Vec<AuditRecord>> {
        let mut records = self.records.write().map_err(|_| AuditError::LockPoisoned)?;

        let mut appended: Vec<AuditRecord> = Vec::with_capacity(events.len());
        for event in events {
            let sequence = (records.len() + appended.len()) as u64;
            let chain = if appended.is_empty() { &records[..] } else { &appended[..] };
            let record = next_record(chain, sequence, event)?;
            appended.push(record);
        }

        self.commit(&mut records, &appended)?;
        Ok(appended)
    }

    /// Persist, then make visible to queries. Nothing becomes visible unless
    /// all of `appended` reached the files.
    fn commit(&self, records: &mut Vec<AuditRecord>, appended: &[AuditRecord]) -> AuditResult<()> {
        if self.out_of_sync.load(Ordering::Acquire) {
            return Err(AuditError::OutOfSync);
        }
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(appended) {
                if matches!(e, AuditError::OutOfSync) {
                    self.out_of_sync.store(true, Ordering::Release);
                }
                return Err(e);
            }
        }
        records.extend_from_slice(appended);

        for record in appended {
            tracing::debug!(
                sequence = record.sequence,
                event_id = %record.event_id,
                "Audit event appended"
            );
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&[AuditRecord]) -> T) -> AuditResult<T> {
        let records = self.records.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(f(&records))
    }

    /// Every record, in append order.
    pub fn all(&self) -> AuditResult<Vec<AuditRecord>> {
        self.read(|records| records.to_vec())
    }

    /// Records whose event timestamp is within `[from, to]`.
    pub fn by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AuditResult<Vec<AuditRecord>> {
        self.query(Some(from), Some(to), None)
    }

    /// Records naming `identity` as owner, recipient, or accessor.
    pub fn by_entity(&self, identity: &Identity) -> AuditResult<Vec<AuditRecord>> {
        self.query(None, None, Some(identity))
    }

    /// Records matching every given filter.
    pub fn query(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        entity: Option<&Identity>,
    ) -> AuditResult<Vec<AuditRecord>> {
        self.read(|records| {
            records
                .iter()
                .filter(|r| from.is_none_or(|from| r.event.timestamp() >= from))
                .filter(|r| to.is_none_or(|to| r.event.timestamp() <= to))
                .filter(|r| entity.is_none_or(|id| r.event.involves(id)))
                .cloned()
                .collect()
        })
    }

    pub fn len(&self) -> AuditResult<usize> {
        self.read(|records| records.len())
    }

    pub fn is_empty(&self) -> AuditResult<bool> {
        self.read(|records| records.is_empty())
    }

    /// Hash of the newest record, or [`GENESIS_HASH`] when empty.
    pub fn head_hash(&self) -> AuditResult<String> {
        self.read(|records| {
            records
                .last()
                .map(|r| r.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string())
        })
    }

    /// Recompute every hash and link.
    pub fn verify_chain(&self) -> AuditResult<()> {
        self.read(verify_records)?
    }
}
