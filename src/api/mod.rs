// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    audit::{AuditEvent, AuditRecord},
    error::ApiError,
    models::{
        AccessCheckResponse, AuditListResponse, BatchGrantAccessRequest, BatchRevokeAccessRequest,
        ChainStatusResponse, GrantAccessRequest, Identity, PublicKeyResponse,
        PublishPublicKeyRequest, RecordReferenceResponse, RevokeAccessResponse,
        UploadRecordRequest, WrappedKeyResponse,
    },
    state::AppState,
};

pub mod audit;
pub mod grants;
pub mod health;
pub mod keys;
pub mod records;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/records", post(records::upload_record))
        .route("/records/{owner}", get(records::get_record_reference))
        .route("/records/{owner}/key", get(records::get_wrapped_key))
        .route("/grants", post(grants::grant_access))
        .route("/grants/batch", post(grants::batch_grant_access))
        .route("/grants/batch-revoke", post(grants::batch_revoke_access))
        .route("/grants/{recipient}", delete(grants::revoke_access))
        .route("/access/{owner}/{accessor}", get(grants::check_access))
        .route("/keys", put(keys::publish_public_key))
        .route("/keys/{identity}", get(keys::get_public_key))
        .route("/audit", get(audit::query_audit))
        .route("/audit/verify", get(audit::verify_audit_chain))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
}

/// Parse an identity path segment.
pub(crate) fn parse_identity(field: &'static str, value: &str) -> Result<Identity, ApiError> {
    Identity::parse(value).map_err(|e| {
        ApiError::new(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_identity",
            format!("{field}: {e}"),
        )
    })
}

/// Decode a hex payload field (an optional `0x` prefix is accepted).
pub(crate) fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    alloy::hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ApiError::bad_request(format!("{field}: invalid hex ({e})")))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        records::upload_record,
        records::get_record_reference,
        records::get_wrapped_key,
        grants::grant_access,
        grants::batch_grant_access,
        grants::revoke_access,
        grants::batch_revoke_access,
        grants::check_access,
        keys::publish_public_key,
        keys::get_public_key,
        audit::query_audit,
        audit::verify_audit_chain,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Identity,
            UploadRecordRequest,
            RecordReferenceResponse,
            WrappedKeyResponse,
            GrantAccessRequest,
            BatchGrantAccessRequest,
            BatchRevokeAccessRequest,
            RevokeAccessResponse,
            AccessCheckResponse,
            PublishPublicKeyRequest,
            PublicKeyResponse,
            AuditEvent,
            AuditRecord,
            AuditListResponse,
            ChainStatusResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Records", description = "Record references and wrapped keys"),
        (name = "Grants", description = "Granting and revoking emergency access"),
        (name = "Keys", description = "Public key directory"),
        (name = "Audit", description = "Hash-chained audit trail"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_lists_registry_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/records",
            "/v1/records/{owner}",
            "/v1/records/{owner}/key",
            "/v1/grants",
            "/v1/grants/{recipient}",
            "/v1/access/{owner}/{accessor}",
            "/v1/keys/{identity}",
            "/v1/audit/verify",
            "/health/ready",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn hex_fields_accept_optional_prefix() {
        assert_eq!(decode_hex("k", "0x0aff").unwrap(), vec![0x0a, 0xff]);
        assert_eq!(decode_hex("k", "0aff").unwrap(), vec![0x0a, 0xff]);
        assert_eq!(decode_hex("k", "zz").unwrap_err().code, "bad_request");
    }
}
