// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{decode_hex, parse_identity};
use crate::{
    auth::{Caller, Signed},
    error::ApiError,
    models::{
        AccessCheckResponse, BatchGrantAccessRequest, BatchRevokeAccessRequest,
        GrantAccessRequest, RevokeAccessResponse,
    },
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/grants",
    request_body = GrantAccessRequest,
    tag = "Grants",
    responses(
        (status = 204, description = "Access granted"),
        (status = 400, description = "Invalid recipient, empty key, or past expiry"),
        (status = 404, description = "Caller has no record")
    )
)]
pub async fn grant_access(
    State(state): State<AppState>,
    Signed { caller, body }: Signed<GrantAccessRequest>,
) -> Result<StatusCode, ApiError> {
    let wrapped_key = decode_hex("wrapped_key", &body.wrapped_key)?;
    state
        .registry
        .grant_access(&caller, &body.recipient, wrapped_key, body.expires_at)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Grant several recipients. Either every grant is applied or none is.
#[utoipa::path(
    post,
    path = "/v1/grants/batch",
    request_body = BatchGrantAccessRequest,
    tag = "Grants",
    responses(
        (status = 204, description = "All grants applied"),
        (status = 400, description = "Batch rejected; nothing applied")
    )
)]
pub async fn batch_grant_access(
    State(state): State<AppState>,
    Signed { caller, body }: Signed<BatchGrantAccessRequest>,
) -> Result<StatusCode, ApiError> {
    let wrapped_keys = body
        .wrapped_keys
        .iter()
        .enumerate()
        .map(|(i, key)| decode_hex(&format!("wrapped_keys[{i}]"), key))
        .collect::<Result<Vec<_>, _>>()?;

    state
        .registry
        .batch_grant_access(&caller, body.recipients, wrapped_keys, body.expires_at)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke one recipient. Revoking a recipient without access is a no-op and
/// returns an empty list.
#[utoipa::path(
    delete,
    path = "/v1/grants/{recipient}",
    params(
        ("recipient" = String, Path, description = "Identity whose access is revoked")
    ),
    tag = "Grants",
    responses(
        (status = 200, body = RevokeAccessResponse),
        (status = 404, description = "Caller has no record")
    )
)]
pub async fn revoke_access(
    Path(recipient): Path<String>,
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<RevokeAccessResponse>, ApiError> {
    let recipient = parse_identity("recipient", &recipient)?;
    let revoked = state.registry.revoke_access(&caller, &recipient).await?;
    Ok(Json(RevokeAccessResponse {
        revoked: if revoked { vec![recipient] } else { Vec::new() },
    }))
}

#[utoipa::path(
    post,
    path = "/v1/grants/batch-revoke",
    request_body = BatchRevokeAccessRequest,
    tag = "Grants",
    responses(
        (status = 200, body = RevokeAccessResponse),
        (status = 400, description = "Empty batch")
    )
)]
pub async fn batch_revoke_access(
    State(state): State<AppState>,
    Signed { caller, body }: Signed<BatchRevokeAccessRequest>,
) -> Result<Json<RevokeAccessResponse>, ApiError> {
    let revoked = state
        .registry
        .batch_revoke_access(&caller, &body.recipients)
        .await?;
    Ok(Json(RevokeAccessResponse { revoked }))
}

/// Pure access predicate. Not audited and needs no signature.
#[utoipa::path(
    get,
    path = "/v1/access/{owner}/{accessor}",
    params(
        ("owner" = String, Path, description = "Record owner"),
        ("accessor" = String, Path, description = "Identity to check")
    ),
    tag = "Grants",
    responses((status = 200, body = AccessCheckResponse))
)]
pub async fn check_access(
    Path((owner, accessor)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AccessCheckResponse>, ApiError> {
    let owner = parse_identity("owner", &owner)?;
    let accessor = parse_identity("accessor", &accessor)?;
    let granted = state.registry.check_access(&owner, &accessor)?;
    Ok(Json(AccessCheckResponse {
        owner,
        accessor,
        granted,
    }))
}
