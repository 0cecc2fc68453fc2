// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Failure taxonomy and HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::registry::RegistryError;

/// Coarse classification shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected input. Never retried.
    Input,
    /// Caller is not allowed, or the target does not exist.
    Authorization,
    /// AEAD or key recovery failure. Retrying with the same inputs fails again.
    Crypto,
    /// Entropy, storage, or timeout failure. Safe to retry with backoff.
    Resource,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Resource)
    }
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::AccessDenied { .. } | RegistryError::NotOwner { .. } => {
                StatusCode::FORBIDDEN
            }
            RegistryError::RecordNotFound(_) | RegistryError::PublicKeyNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::Store(_) | RegistryError::Audit(_) => {
                tracing::error!(error = %err, "Registry backend failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.error_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn only_resource_errors_are_retryable() {
        assert!(ErrorClass::Resource.is_retryable());
        assert!(!ErrorClass::Input.is_retryable());
        assert!(!ErrorClass::Authorization.is_retryable());
        assert!(!ErrorClass::Crypto.is_retryable());
    }

    #[test]
    fn constructors_set_status_and_code() {
        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.code, "bad_request");

        let internal = ApiError::internal("boom");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message, "boom");
    }

    #[test]
    fn registry_errors_map_to_http_status() {
        use crate::{models::Identity, storage::StoreError};

        let a = Identity::from_address_bytes(&[1; 20]);
        let b = Identity::from_address_bytes(&[2; 20]);

        let denied = ApiError::from(RegistryError::AccessDenied {
            accessor: a.clone(),
            owner: b.clone(),
        });
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.code, "access_denied");

        let missing = ApiError::from(RegistryError::RecordNotFound(a));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let batch = ApiError::from(RegistryError::InvalidExpiry.at_index(1));
        assert_eq!(batch.status, StatusCode::BAD_REQUEST);
        assert_eq!(batch.code, "invalid_expiry");

        let store = ApiError::from(RegistryError::Store(StoreError::LockPoisoned));
        assert_eq!(store.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
