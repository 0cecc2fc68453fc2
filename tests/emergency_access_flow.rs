// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end emergency access scenarios: over the signed HTTP surface, and
//! through the client workflows against on-disk stores.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use emergency_access::{
    api::router,
    auth::{sign_call, IDENTITY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    client::{ClientError, PatientClient, RecipientClient},
    clock::ManualClock,
    crypto::{generate_key, parse_public_key, unwrap_symmetric_key, wrap, FileDescriptor, IdentityKeyPair},
    registry::{Registry, RegistryError},
    state::AppState,
    storage::{FsBlobStore, StoragePaths},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn send(
    app: &Router,
    signer: Option<&IdentityKeyPair>,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");

    if let Some(keys) = signer {
        let timestamp = Utc::now().timestamp();
        let signature = sign_call(keys, method, path, timestamp, body.as_bytes()).unwrap();
        builder = builder
            .header(IDENTITY_HEADER, keys.identity().as_str())
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(SIGNATURE_HEADER, signature);
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn grant_access_revoke_over_http() {
    let app = router(AppState::default());
    let patient = IdentityKeyPair::generate().unwrap();
    let medic = IdentityKeyPair::generate().unwrap();
    let p = patient.identity().as_str().to_string();
    let m = medic.identity().as_str().to_string();

    // Medic publishes a key the patient can wrap for
    let (status, _) = send(
        &app,
        Some(&medic),
        "PUT",
        "/v1/keys",
        Some(json!({ "public_key": alloy::hex::encode(medic.compressed_public_key()) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, None, "GET", &format!("/v1/keys/{m}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let medic_key = alloy::hex::decode(body["public_key"].as_str().unwrap()).unwrap();

    // Patient uploads and can read their own record
    let (status, _) = send(
        &app,
        Some(&patient),
        "POST",
        "/v1/records",
        Some(json!({ "content_reference": "ref-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, None, "GET", &format!("/v1/access/{p}/{p}"), None).await;
    assert_eq!(body["granted"], true);

    let (status, body) = send(&app, Some(&patient), "GET", &format!("/v1/records/{p}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content_reference"], "ref-1");

    // Grant the medic
    let record_key = generate_key().unwrap();
    let wrapped = wrap(record_key.as_bytes(), &parse_public_key(&medic_key).unwrap())
        .unwrap()
        .to_bytes();
    let (status, _) = send(
        &app,
        Some(&patient),
        "POST",
        "/v1/grants",
        Some(json!({ "recipient": m, "wrapped_key": alloy::hex::encode(&wrapped) })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, None, "GET", &format!("/v1/access/{p}/{m}"), None).await;
    assert_eq!(body["granted"], true);

    let (status, body) = send(&app, Some(&medic), "GET", &format!("/v1/records/{p}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content_reference"], "ref-1");

    let (status, body) = send(&app, Some(&medic), "GET", &format!("/v1/records/{p}/key"), None).await;
    assert_eq!(status, StatusCode::OK);
    let released = alloy::hex::decode(body["wrapped_key"].as_str().unwrap()).unwrap();
    assert_eq!(unwrap_symmetric_key(&released, &medic).unwrap(), record_key);

    // Revoke twice: only the first changes anything
    let (status, body) = send(&app, Some(&patient), "DELETE", &format!("/v1/grants/{m}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], json!([m]));

    let (_, body) = send(&app, Some(&patient), "DELETE", &format!("/v1/grants/{m}"), None).await;
    assert_eq!(body["revoked"], json!([]));

    let (_, body) = send(&app, None, "GET", &format!("/v1/access/{p}/{m}"), None).await;
    assert_eq!(body["granted"], false);

    let (status, body) = send(&app, Some(&medic), "GET", &format!("/v1/records/{p}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "access_denied");

    // Audit trail shows every decision, in order
    let (status, body) = send(&app, Some(&patient), "GET", "/v1/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    let events: Vec<(String, Option<bool>)> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            let event = &r["event"];
            let flag = event
                .get("success")
                .or_else(|| event.get("granted"))
                .and_then(Value::as_bool);
            (event["type"].as_str().unwrap().to_string(), flag)
        })
        .collect();
    assert_eq!(
        events,
        vec![
            ("uploaded".to_string(), None),
            ("access_attempted".to_string(), Some(true)),
            ("permission_changed".to_string(), Some(true)),
            ("access_attempted".to_string(), Some(true)),
            ("permission_changed".to_string(), Some(false)),
            ("access_attempted".to_string(), Some(false)),
        ]
    );

    let (_, body) = send(&app, None, "GET", "/v1/audit/verify", None).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["length"], 6);
}

#[tokio::test]
async fn unsigned_mutation_is_rejected() {
    let app = router(AppState::default());
    let (status, body) = send(
        &app,
        None,
        "POST",
        "/v1/records",
        Some(json!({ "content_reference": "ref-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_auth_header");
}

#[tokio::test]
async fn health_probes_respond() {
    let app = router(AppState::default());
    let (status, body) = send(&app, None, "GET", "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, None, "GET", "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn time_limited_grant_through_clients_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let paths = StoragePaths::new(temp_dir.path());
    let start = Utc.with_ymd_and_hms(2026, 7, 4, 6, 30, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));

    let registry = Arc::new(Registry::open(&paths, clock.clone()).unwrap());
    let blobs = Arc::new(FsBlobStore::new(paths.clone()));

    let patient = PatientClient::new(IdentityKeyPair::generate().unwrap(), registry.clone(), blobs.clone());
    let paramedic = RecipientClient::new(IdentityKeyPair::generate().unwrap(), registry.clone(), blobs.clone());
    paramedic.register().await.unwrap();

    let published = patient
        .publish(
            b"DNR: no. Allergies: latex.",
            &FileDescriptor::new("summary.txt", "text/plain"),
            &[],
            TIMEOUT,
        )
        .await
        .unwrap();
    assert!(paths.blob(published.content_reference.digest_hex()).exists());

    patient
        .authorize(
            paramedic.identity(),
            &published.key,
            Some(start + ChronoDuration::hours(12)),
        )
        .await
        .unwrap();

    let (plaintext, metadata) = paramedic.open(patient.identity(), TIMEOUT).await.unwrap();
    assert_eq!(plaintext, b"DNR: no. Allergies: latex.");
    assert_eq!(metadata.file_type, "text/plain");

    clock.advance(ChronoDuration::hours(13));
    let err = paramedic.open(patient.identity(), TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Registry(RegistryError::AccessDenied { .. })
    ));

    // Everything above is on disk and the chain still verifies after reopen
    drop(patient);
    drop(paramedic);
    drop(registry);
    let reopened = Registry::open(&paths, clock).unwrap();
    reopened.audit().verify_chain().unwrap();
    // uploaded, granted, two access attempts
    assert_eq!(reopened.audit().len().unwrap(), 4);
}
