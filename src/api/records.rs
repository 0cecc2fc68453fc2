// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::parse_identity;
use crate::{
    auth::{Caller, Signed},
    error::ApiError,
    models::{RecordReferenceResponse, UploadRecordRequest, WrappedKeyResponse},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/records",
    request_body = UploadRecordRequest,
    tag = "Records",
    responses(
        (status = 201, body = RecordReferenceResponse),
        (status = 400, description = "Empty content reference"),
        (status = 401, description = "Missing or invalid call signature")
    )
)]
pub async fn upload_record(
    State(state): State<AppState>,
    Signed { caller, body }: Signed<UploadRecordRequest>,
) -> Result<(StatusCode, Json<RecordReferenceResponse>), ApiError> {
    state
        .registry
        .upload_record(&caller, &body.content_reference)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RecordReferenceResponse {
            owner: caller,
            content_reference: body.content_reference,
        }),
    ))
}

/// Release a record reference. Every call is audited, including denials.
#[utoipa::path(
    get,
    path = "/v1/records/{owner}",
    params(
        ("owner" = String, Path, description = "Identity of the record owner")
    ),
    tag = "Records",
    responses(
        (status = 200, body = RecordReferenceResponse),
        (status = 403, description = "Caller holds no live grant"),
        (status = 404, description = "Owner has no record")
    )
)]
pub async fn get_record_reference(
    Path(owner): Path<String>,
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<RecordReferenceResponse>, ApiError> {
    let owner = parse_identity("owner", &owner)?;
    let content_reference = state
        .registry
        .get_record_reference(&caller, &owner)
        .await?;
    Ok(Json(RecordReferenceResponse {
        owner,
        content_reference,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/records/{owner}/key",
    params(
        ("owner" = String, Path, description = "Identity of the record owner")
    ),
    tag = "Records",
    responses(
        (status = 200, body = WrappedKeyResponse),
        (status = 403, description = "Caller holds no live grant")
    )
)]
pub async fn get_wrapped_key(
    Path(owner): Path<String>,
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<WrappedKeyResponse>, ApiError> {
    let owner = parse_identity("owner", &owner)?;
    let grant = state.registry.get_wrapped_key(&caller, &owner)?;
    Ok(Json(WrappedKeyResponse {
        owner,
        wrapped_key: alloy::hex::encode(&grant.wrapped_key),
        expires_at: grant.expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn id(byte: u8) -> Identity {
        Identity::from_address_bytes(&[byte; 20])
    }

    async fn upload(state: &AppState, owner: Identity, reference: &str) {
        let (status, _) = upload_record(
            State(state.clone()),
            Signed {
                caller: owner,
                body: UploadRecordRequest {
                    content_reference: reference.into(),
                },
            },
        )
        .await
        .expect("upload succeeds");
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn owner_reads_own_reference() {
        let state = AppState::default();
        upload(&state, id(1), "sha256:abc").await;

        let Json(response) = get_record_reference(
            Path(id(1).to_string()),
            State(state.clone()),
            Caller(id(1)),
        )
        .await
        .unwrap();
        assert_eq!(response.content_reference, "sha256:abc");
    }

    #[tokio::test]
    async fn stranger_is_forbidden_and_audited() {
        let state = AppState::default();
        upload(&state, id(1), "sha256:abc").await;

        let err = get_record_reference(
            Path(id(1).to_string()),
            State(state.clone()),
            Caller(id(2)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.code, "access_denied");
        assert_eq!(state.registry.audit().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_reference_is_bad_request() {
        let state = AppState::default();
        let err = upload_record(
            State(state),
            Signed {
                caller: id(1),
                body: UploadRecordRequest {
                    content_reference: "".into(),
                },
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "empty_input");
    }

    #[tokio::test]
    async fn malformed_owner_is_bad_request() {
        let err = get_wrapped_key(
            Path("not-an-address".into()),
            State(AppState::default()),
            Caller(id(1)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_identity");
    }
}
