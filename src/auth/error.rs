// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Signed-call authentication error.
#[derive(Debug)]
pub enum AuthError {
    /// A required signature header is absent.
    MissingHeader(&'static str),
    /// A signature header is present but unparseable.
    InvalidHeader(&'static str),
    /// The signed timestamp is outside the accepted clock skew.
    StaleTimestamp,
    /// The signature does not recover to any key.
    InvalidSignature,
    /// The signature recovers to a different identity than claimed.
    SignerMismatch,
    /// The request body could not be read or decoded.
    InvalidBody(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader(_) => "missing_auth_header",
            AuthError::InvalidHeader(_) => "invalid_auth_header",
            AuthError::StaleTimestamp => "stale_timestamp",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::SignerMismatch => "signer_mismatch",
            AuthError::InvalidBody(_) => "invalid_body",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingHeader(name) => write!(f, "{name} header is required"),
            AuthError::InvalidHeader(name) => write!(f, "{name} header is malformed"),
            AuthError::StaleTimestamp => write!(f, "Request timestamp is outside the accepted window"),
            AuthError::InvalidSignature => write!(f, "Request signature is invalid"),
            AuthError::SignerMismatch => write!(f, "Request was not signed by the claimed identity"),
            AuthError::InvalidBody(msg) => write!(f, "Invalid request body: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_header_returns_401() {
        let response = AuthError::MissingHeader("x-signature").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
        assert_eq!(body["error"], "x-signature header is required");
    }

    #[tokio::test]
    async fn bad_body_returns_400() {
        let response = AuthError::InvalidBody("eof".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
