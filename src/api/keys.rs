// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};

use super::{decode_hex, parse_identity};
use crate::{
    auth::Signed,
    error::ApiError,
    models::{PublicKeyResponse, PublishPublicKeyRequest},
    state::AppState,
};

/// Publish the caller's compressed public key. The key must derive to the
/// calling identity.
#[utoipa::path(
    put,
    path = "/v1/keys",
    request_body = PublishPublicKeyRequest,
    tag = "Keys",
    responses(
        (status = 200, body = PublicKeyResponse),
        (status = 400, description = "Malformed key or key of another identity")
    )
)]
pub async fn publish_public_key(
    State(state): State<AppState>,
    Signed { caller, body }: Signed<PublishPublicKeyRequest>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let public_key = decode_hex("public_key", &body.public_key)?;
    state
        .registry
        .publish_public_key(&caller, &public_key)
        .await?;

    let entry = state.registry.get_public_key(&caller)?;
    Ok(Json(PublicKeyResponse {
        identity: entry.identity,
        public_key: alloy::hex::encode(entry.public_key),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/keys/{identity}",
    params(
        ("identity" = String, Path, description = "Identity to look up")
    ),
    tag = "Keys",
    responses(
        (status = 200, body = PublicKeyResponse),
        (status = 404, description = "No key published")
    )
)]
pub async fn get_public_key(
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let identity = parse_identity("identity", &identity)?;
    let entry = state.registry.get_public_key(&identity)?;
    Ok(Json(PublicKeyResponse {
        identity: entry.identity,
        public_key: alloy::hex::encode(entry.public_key),
    }))
}
