//! Shared helpers for Drive API integration tests
//!
//! The mock server serves both endpoints: metadata under `/drive/v3` and
//! uploads under `/upload/drive/v3`, mirroring the real URL layout.

use std::sync::Arc;

use wiremock::MockServer;

use cloudmirror_core::config::TransferLimits;
use cloudmirror_core::domain::{FileId, FolderId};
use cloudmirror_drive::{DriveClient, StaticTokenProvider};

pub const TOKEN: &str = "test-access-token";

/// Start a mock server and a client pointed at it
pub async fn setup_drive_mock() -> (MockServer, DriveClient) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_urls(
        Arc::new(StaticTokenProvider::new(TOKEN)),
        format!("{}/drive/v3", server.uri()),
        format!("{}/upload/drive/v3", server.uri()),
    );
    (server, client)
}

/// Like [`setup_drive_mock`], but anything over `threshold` bytes goes
/// through a resumable session in `chunk` byte pieces
pub async fn setup_chunked_mock(threshold: u64, chunk: u64) -> (MockServer, DriveClient) {
    let (server, client) = setup_drive_mock().await;
    let client = client.with_transfer_limits(TransferLimits {
        resumable_threshold: threshold,
        chunk_size: chunk,
    });
    (server, client)
}

/// Session URI handed out by the mock server
pub fn session_uri(server: &MockServer, id: &str) -> String {
    format!("{}/upload/session/{id}", server.uri())
}

pub fn folder(id: &str) -> FolderId {
    FolderId::new(id.to_string()).unwrap()
}

pub fn file(id: &str) -> FileId {
    FileId::new(id.to_string()).unwrap()
}

pub fn bearer() -> String {
    format!("Bearer {TOKEN}")
}
