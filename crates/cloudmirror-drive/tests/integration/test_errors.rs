//! Mapping of Drive error responses onto RemoteError

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use cloudmirror_core::ports::{IRemoteStore, RemoteError};
use cloudmirror_drive::{DriveClient, StaticTokenProvider};

use crate::common::*;

async fn create_folder_with(response: ResponseTemplate) -> RemoteError {
    let (server, client) = setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(response)
        .mount(&server)
        .await;

    client
        .create_folder(&folder("root-folder"), "notes")
        .await
        .unwrap_err()
}

fn drive_error(code: u16, reason: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [{"domain": "usageLimits", "reason": reason, "message": message}]
        }
    })
}

#[tokio::test]
async fn test_401_is_unauthorized() {
    let err = create_folder_with(
        ResponseTemplate::new(401).set_body_json(drive_error(401, "authError", "Invalid Credentials")),
    )
    .await;
    assert_eq!(err, RemoteError::Unauthorized("Invalid Credentials".into()));
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let err = create_folder_with(ResponseTemplate::new(429).insert_header("Retry-After", "7")).await;
    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
}

#[tokio::test]
async fn test_403_rate_limit_reason_is_throttling() {
    let err = create_folder_with(ResponseTemplate::new(403).set_body_json(drive_error(
        403,
        "userRateLimitExceeded",
        "User rate limit exceeded",
    )))
    .await;
    assert!(matches!(err, RemoteError::RateLimited { retry_after: None }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_403_permission_is_rejected() {
    let err = create_folder_with(ResponseTemplate::new(403).set_body_json(drive_error(
        403,
        "insufficientFilePermissions",
        "The user does not have sufficient permissions",
    )))
    .await;
    assert!(matches!(err, RemoteError::Rejected(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_404_parent_is_not_found() {
    let err = create_folder_with(
        ResponseTemplate::new(404).set_body_json(drive_error(404, "notFound", "File not found: root-folder")),
    )
    .await;
    assert_eq!(err, RemoteError::NotFound("File not found: root-folder".into()));
}

#[tokio::test]
async fn test_5xx_is_transient() {
    let err = create_folder_with(ResponseTemplate::new(503).set_body_string("backend error")).await;
    assert!(matches!(err, RemoteError::TransientNetwork(ref m) if m.contains("503")));
}

#[tokio::test]
async fn test_success_without_id_is_rejected() {
    let err = create_folder_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({}))).await;
    assert!(matches!(err, RemoteError::Rejected(ref m) if m.contains("no id")));
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let (server, _) = setup_drive_mock().await;
    let client = DriveClient::with_base_urls(
        Arc::new(StaticTokenProvider::new("")),
        format!("{}/drive/v3", server.uri()),
        format!("{}/upload/drive/v3", server.uri()),
    );

    let err = client
        .create_folder(&folder("root-folder"), "notes")
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert!(server.received_requests().await.unwrap().is_empty());
}
