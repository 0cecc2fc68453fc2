// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    audit::AuditError,
    auth::Caller,
    error::ApiError,
    models::{AuditListResponse, AuditQuery, ChainStatusResponse},
    state::AppState,
};

/// Query the audit trail by time range and/or entity.
#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditQuery),
    tag = "Audit",
    responses(
        (status = 200, body = AuditListResponse),
        (status = 401, description = "Missing or invalid call signature")
    )
)]
pub async fn query_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditQuery>,
    Caller(caller): Caller,
) -> Result<Json<AuditListResponse>, ApiError> {
    let records = state
        .registry
        .audit()
        .query(params.from, params.to, params.entity.as_ref())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::debug!(caller = %caller, results = records.len(), "Audit query");
    Ok(Json(AuditListResponse {
        total: records.len(),
        records,
    }))
}

/// Recompute every hash and link in the audit chain.
#[utoipa::path(
    get,
    path = "/v1/audit/verify",
    tag = "Audit",
    responses((status = 200, body = ChainStatusResponse))
)]
pub async fn verify_audit_chain(
    State(state): State<AppState>,
) -> Result<Json<ChainStatusResponse>, ApiError> {
    let audit = state.registry.audit();
    let internal = |e: AuditError| ApiError::internal(e.to_string());

    let length = audit.len().map_err(internal)? as u64;
    let head_hash = audit.head_hash().map_err(internal)?;
    let broken_at = match audit.verify_chain() {
        Ok(()) => None,
        Err(AuditError::ChainBroken { sequence }) => {
            tracing::error!(sequence, "Audit chain verification failed");
            Some(sequence)
        }
        Err(e) => return Err(internal(e)),
    };

    Ok(Json(ChainStatusResponse {
        valid: broken_at.is_none(),
        length,
        head_hash,
        broken_at,
    }))
}
