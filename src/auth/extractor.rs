// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for signed calls.
//!
//! Use `Caller` on handlers without a body and `Signed<T>` on handlers that
//! take a JSON body, since the body hash is part of the signed message:
//!
//! ```rust,ignore
//! async fn get_record(Caller(caller): Caller, ...) -> ... { }
//! async fn grant(Signed { caller, body }: Signed<GrantAccessRequest>, ...) -> ... { }
//! ```

use axum::{
    body::to_bytes,
    extract::{FromRequest, FromRequestParts, OriginalUri, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use super::{signing_message, AuthError, IDENTITY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::{crypto::recover_signer, models::Identity, state::AppState};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: i64 = 60;

/// Largest signed body accepted (wrapped keys are small; batches stay well below this).
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Authenticated caller of a request without a body.
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = verify_signed_call(parts, &[], state.clock.now().timestamp())?;
        Ok(Caller(caller))
    }
}

/// Authenticated caller plus its decoded JSON body.
pub struct Signed<T> {
    pub caller: Identity,
    pub body: T,
}

impl<T> FromRequest<AppState> for Signed<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AuthError::InvalidBody(e.to_string()))?;

        let caller = verify_signed_call(&parts, &bytes, state.clock.now().timestamp())?;
        let body = serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidBody(e.to_string()))?;

        Ok(Signed { caller, body })
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AuthError> {
    parts
        .headers
        .get(name)
        .ok_or(AuthError::MissingHeader(name))?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader(name))
}

/// Verify the signature headers against the request and return the signer.
fn verify_signed_call(parts: &Parts, body: &[u8], now: i64) -> Result<Identity, AuthError> {
    let claimed = Identity::parse(header(parts, IDENTITY_HEADER)?)
        .map_err(|_| AuthError::InvalidHeader(IDENTITY_HEADER))?;

    let timestamp: i64 = header(parts, TIMESTAMP_HEADER)?
        .parse()
        .map_err(|_| AuthError::InvalidHeader(TIMESTAMP_HEADER))?;
    if (now - timestamp).abs() > CLOCK_SKEW_LEEWAY {
        return Err(AuthError::StaleTimestamp);
    }

    let signature = header(parts, SIGNATURE_HEADER)?;
    let signature = alloy::hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| AuthError::InvalidHeader(SIGNATURE_HEADER))?;

    // Nested routers strip the /v1 prefix from `parts.uri`
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(&parts.uri);
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let message = signing_message(parts.method.as_str(), path_and_query, timestamp, body);
    let signer =
        recover_signer(message.as_bytes(), &signature).map_err(|_| AuthError::InvalidSignature)?;

    if signer != claimed {
        tracing::warn!(claimed = %claimed, signer = %signer, "Signed call identity mismatch");
        return Err(AuthError::SignerMismatch);
    }
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audit::AuditLog,
        auth::sign_call,
        clock::ManualClock,
        crypto::IdentityKeyPair,
        registry::Registry,
        storage::MemoryRegistryStore,
    };
    use axum::{body::Body, http::Request as HttpRequest};
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;
    use std::sync::Arc;

    const NOW: i64 = 1_780_000_000;

    fn state() -> AppState {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(NOW, 0).unwrap()));
        AppState::new(Arc::new(Registry::new(
            Arc::new(MemoryRegistryStore::new()),
            Arc::new(AuditLog::in_memory()),
            clock,
        )))
    }

    fn signed_request(
        keys: &IdentityKeyPair,
        method: &str,
        path: &str,
        timestamp: i64,
        body: &'static str,
    ) -> HttpRequest<Body> {
        let signature = sign_call(keys, method, path, timestamp, body.as_bytes()).unwrap();
        HttpRequest::builder()
            .method(method)
            .uri(path)
            .header(IDENTITY_HEADER, keys.identity().as_str())
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    #[derive(Deserialize)]
    struct Payload {
        value: u32,
    }

    #[tokio::test]
    async fn caller_requires_identity_header() {
        let mut parts = HttpRequest::builder()
            .uri("/v1/records/0x00")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Caller::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(result, Err(AuthError::MissingHeader(IDENTITY_HEADER))));
    }

    #[tokio::test]
    async fn caller_accepts_valid_signature() {
        let keys = IdentityKeyPair::generate().unwrap();
        let (mut parts, _) = signed_request(&keys, "GET", "/v1/records/x?y=1", NOW, "").into_parts();

        let Caller(caller) = Caller::from_request_parts(&mut parts, &state()).await.unwrap();
        assert_eq!(&caller, keys.identity());
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let keys = IdentityKeyPair::generate().unwrap();
        let (mut parts, _) =
            signed_request(&keys, "GET", "/v1/records/x", NOW - 120, "").into_parts();

        let result = Caller::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(result, Err(AuthError::StaleTimestamp)));
    }

    #[tokio::test]
    async fn signature_for_other_path_does_not_verify_as_claimed() {
        let keys = IdentityKeyPair::generate().unwrap();
        let (mut parts, _) = signed_request(&keys, "GET", "/v1/records/a", NOW, "").into_parts();
        parts.uri = "/v1/records/b".parse().unwrap();

        let result = Caller::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(
            result,
            Err(AuthError::SignerMismatch | AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn claimed_identity_must_match_signer() {
        let keys = IdentityKeyPair::generate().unwrap();
        let other = IdentityKeyPair::generate().unwrap();
        let mut request = signed_request(&keys, "GET", "/v1/keys/x", NOW, "");
        request.headers_mut().insert(
            IDENTITY_HEADER,
            other.identity().as_str().parse().unwrap(),
        );
        let (mut parts, _) = request.into_parts();

        let result = Caller::from_request_parts(&mut parts, &state()).await;
        assert!(matches!(result, Err(AuthError::SignerMismatch)));
    }

    #[tokio::test]
    async fn signed_body_is_decoded() {
        let keys = IdentityKeyPair::generate().unwrap();
        let request = signed_request(&keys, "POST", "/v1/grants", NOW, r#"{"value":7}"#);

        let Signed { caller, body } = Signed::<Payload>::from_request(request, &state())
            .await
            .unwrap();
        assert_eq!(&caller, keys.identity());
        assert_eq!(body.value, 7);
    }

    #[tokio::test]
    async fn tampered_body_fails_verification() {
        let keys = IdentityKeyPair::generate().unwrap();
        let signed = signed_request(&keys, "POST", "/v1/grants", NOW, r#"{"value":7}"#);
        let (parts, _) = signed.into_parts();
        let request = HttpRequest::from_parts(parts, Body::from(r#"{"value":8}"#));

        let result = Signed::<Payload>::from_request(request, &state()).await;
        assert!(matches!(
            result,
            Err(AuthError::SignerMismatch | AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_a_body_error() {
        let keys = IdentityKeyPair::generate().unwrap();
        let request = signed_request(&keys, "POST", "/v1/grants", NOW, "not json");

        let result = Signed::<Payload>::from_request(request, &state()).await;
        assert!(matches!(result, Err(AuthError::InvalidBody(_))));
    }
}
