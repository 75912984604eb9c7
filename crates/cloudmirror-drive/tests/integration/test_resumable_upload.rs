//! Resumable sessions for content above the transfer threshold

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cloudmirror_core::ports::{IRemoteStore, RemoteError, UploadSource};

use crate::common::*;

fn put_bodies(requests: &[wiremock::Request]) -> Vec<(String, Vec<u8>)> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| {
            let range = r
                .headers
                .get("content-range")
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            (range, r.body.clone())
        })
        .collect()
}

#[tokio::test]
async fn test_create_opens_session_and_sends_chunks() {
    let (server, client) = setup_chunked_mock(4, 4).await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("fields", "id"))
        .and(header("authorization", bearer().as_str()))
        .and(header("x-upload-content-length", "10"))
        .and(body_json(serde_json::json!({
            "name": "big.bin",
            "parents": ["folder-notes"]
        })))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s1")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/s1"))
        .and(header("content-range", "bytes 0-3/10"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-3"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s1"))
        .and(header("content-range", "bytes 4-7/10"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-7"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s1"))
        .and(header("content-range", "bytes 8-9/10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-big"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client
        .create_file(
            &folder("folder-notes"),
            "big.bin",
            &UploadSource::from(b"0123456789".as_slice()),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "file-big");

    let puts = put_bodies(&server.received_requests().await.unwrap());
    assert_eq!(
        puts,
        vec![
            ("bytes 0-3/10".to_string(), b"0123".to_vec()),
            ("bytes 4-7/10".to_string(), b"4567".to_vec()),
            ("bytes 8-9/10".to_string(), b"89".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_update_streams_file_source() {
    let (server, client) = setup_chunked_mock(8, 8).await;
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("video.raw");
    std::fs::write(&local, b"abcdefghijkl").unwrap();

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/file-v"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("fields", "id,version"))
        .and(header("x-upload-content-length", "12"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s2"))
        .and(header("content-range", "bytes 0-7/12"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-7"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s2"))
        .and(header("content-range", "bytes 8-11/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-v",
            "version": "9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = UploadSource::File {
        path: local,
        len: 12,
    };
    let revision = client
        .update_file_content(&file("file-v"), &source)
        .await
        .unwrap();
    assert_eq!(revision.as_str(), "9");

    let puts = put_bodies(&server.received_requests().await.unwrap());
    assert_eq!(puts[0].1, b"abcdefgh");
    assert_eq!(puts[1].1, b"ijkl");
}

#[tokio::test]
async fn test_partial_ack_resends_from_committed_offset() {
    let (server, client) = setup_chunked_mock(4, 6).await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s3")))
        .mount(&server)
        .await;
    // the server keeps only the first 4 of 6 bytes
    Mock::given(method("PUT"))
        .and(path("/upload/session/s3"))
        .and(header("content-range", "bytes 0-5/8"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-3"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s3"))
        .and(header("content-range", "bytes 4-7/8"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "file-p"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client
        .create_file(
            &folder("root-folder"),
            "p.bin",
            &UploadSource::from(b"ABCDEFGH".as_slice()),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "file-p");

    let puts = put_bodies(&server.received_requests().await.unwrap());
    assert_eq!(puts[1].1, b"EFGH");
}

#[tokio::test]
async fn test_session_without_progress_is_transient() {
    let (server, client) = setup_chunked_mock(2, 4).await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s4")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s4"))
        .respond_with(ResponseTemplate::new(308))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .create_file(
            &folder("root-folder"),
            "s.bin",
            &UploadSource::from(b"12345678".as_slice()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::TransientNetwork(ref m) if m.contains("no progress")));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_session_without_location_is_rejected() {
    let (server, client) = setup_chunked_mock(2, 4).await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client
        .create_file(
            &folder("root-folder"),
            "s.bin",
            &UploadSource::from(b"12345678".as_slice()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Rejected(ref m) if m.contains("Location")));
}

#[tokio::test]
async fn test_each_chunk_gets_its_own_deadline() {
    let (server, client) = setup_chunked_mock(2, 4).await;
    let client = client.with_request_timeout(Duration::from_millis(300));

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s5")))
        .mount(&server)
        .await;
    // each chunk is answered within its own deadline although the whole
    // transfer takes longer than one deadline
    Mock::given(method("PUT"))
        .and(path("/upload/session/s5"))
        .and(header("content-range", "bytes 0-3/8"))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("Range", "bytes=0-3")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s5"))
        .and(header("content-range", "bytes 4-7/8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": "file-slow"}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let id = client
        .create_file(
            &folder("root-folder"),
            "slow.bin",
            &UploadSource::from(b"abcdefgh".as_slice()),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "file-slow");
}

#[tokio::test]
async fn test_stuck_chunk_times_out() {
    let (server, client) = setup_chunked_mock(2, 4).await;
    let client = client.with_request_timeout(Duration::from_millis(200));

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s6")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/s6"))
        .respond_with(ResponseTemplate::new(308).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client
        .create_file(
            &folder("root-folder"),
            "stuck.bin",
            &UploadSource::from(b"abcdefgh".as_slice()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn test_missing_file_source_is_unreadable() {
    let (server, client) = setup_chunked_mock(2, 4).await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri(&server, "s7")))
        .mount(&server)
        .await;

    let source = UploadSource::File {
        path: dir.path().join("vanished.bin"),
        len: 64,
    };
    let err = client
        .create_file(&folder("root-folder"), "vanished.bin", &source)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::SourceUnreadable(_)));
}

#[tokio::test]
async fn test_small_content_keeps_simple_upload() {
    let (server, client) = setup_chunked_mock(64, 4).await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client
        .create_file(
            &folder("root-folder"),
            "small.txt",
            &UploadSource::from(b"tiny".as_slice()),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "file-small");
}
