//! Google Drive v3 HTTP client
//!
//! [`DriveClient`] implements [`IRemoteStore`] over the Drive REST API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `create_folder` | `POST {api}/files` with folder metadata |
//! | `create_file` | `POST {upload}/files?uploadType=multipart` |
//! | `update_file_content` | `PATCH {upload}/files/{id}?uploadType=media` |
//! | `find_folder` / `find_file` | `GET {api}/files?q=...` |
//!
//! Content above [`TransferLimits::resumable_threshold`] goes through a
//! resumable session instead: the same POST or PATCH with
//! `uploadType=resumable` returns a session URI in `Location`, then the
//! bytes follow as `PUT`s of `chunk_size` with a `Content-Range` header.
//! `308` acknowledges a chunk (its `Range` header says how much the server
//! kept) and the final chunk answers with the file metadata. File sources
//! are read one chunk at a time.
//!
//! Each request fetches a bearer token from the session provider and is
//! bounded by the request timeout, so a chunked upload gets the timeout
//! per chunk. Status codes are mapped onto [`DriveError`] and from there
//! onto [`RemoteError`]; retries are the caller's concern.

use std::borrow::Cow;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use cloudmirror_core::config::{RemoteConfig, TransferLimits};
use cloudmirror_core::domain::{FileId, FolderId, RevisionId};
use cloudmirror_core::ports::{IRemoteStore, ISessionProvider, RemoteError, UploadSource};

use crate::rate_limit::{is_rate_limit_reason, parse_retry_after};
use crate::DriveError;

/// Default Drive v3 metadata endpoint
pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// Default Drive v3 upload endpoint
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

// ============================================================================
// Drive API payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<ListedItem>,
}

#[derive(Debug, Deserialize)]
struct ListedItem {
    id: String,
}

/// Metadata of a single item, as returned by `GET /files/{id}`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

// ============================================================================
// DriveClient
// ============================================================================

pub struct DriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
    session: Arc<dyn ISessionProvider>,
    limits: TransferLimits,
    request_timeout: Duration,
}

impl DriveClient {
    /// Client against the public Drive endpoints
    pub fn new(session: Arc<dyn ISessionProvider>) -> Self {
        Self::with_base_urls(session, DRIVE_API_URL, DRIVE_UPLOAD_URL)
    }

    /// Client against custom endpoints (a proxy, or a mock server in tests)
    pub fn with_base_urls(
        session: Arc<dyn ISessionProvider>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        let defaults = RemoteConfig::default();
        Self {
            client: Client::new(),
            api_base: trim_base(api_base.into()),
            upload_base: trim_base(upload_base.into()),
            session,
            limits: defaults.transfer_limits(),
            request_timeout: defaults.call_timeout(),
        }
    }

    pub fn from_config(remote: &RemoteConfig, session: Arc<dyn ISessionProvider>) -> Self {
        Self::with_base_urls(session, &remote.api_base_url, &remote.upload_base_url)
            .with_transfer_limits(remote.transfer_limits())
            .with_request_timeout(remote.call_timeout())
    }

    pub fn with_transfer_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Deadline for each HTTP request, including each chunk of an upload
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn upload_base(&self) -> &str {
        &self.upload_base
    }

    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder, DriveError> {
        let token = self.session.access_token().await.map_err(|e| match e {
            RemoteError::Unauthorized(msg) => DriveError::Unauthorized(msg),
            other => DriveError::Unauthorized(other.to_string()),
        })?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .timeout(self.request_timeout))
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                DriveError::Timeout(self.request_timeout)
            } else {
                DriveError::Network(err)
            }
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DriveError> {
        let response = check_status(self.dispatch(request).await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Metadata for a single item
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, id: &str) -> Result<DriveItem, DriveError> {
        let url = format!("{}/files/{}", self.api_base, id);
        let request = self
            .authorized(Method::GET, &url)
            .await?
            .query(&[("fields", "id,name,mimeType,trashed")]);
        self.send(request).await
    }

    async fn find_child(
        &self,
        parent: &str,
        name: &str,
        folders: bool,
    ) -> Result<Option<String>, DriveError> {
        let q = child_query(parent, name, folders);
        let url = format!("{}/files", self.api_base);
        let request = self.authorized(Method::GET, &url).await?.query(&[
            ("q", q.as_str()),
            ("fields", "files(id)"),
            ("spaces", "drive"),
            ("pageSize", "10"),
        ]);

        let list: FileList = self.send(request).await?;
        if list.files.len() > 1 {
            warn!(
                parent,
                name,
                matches = list.files.len(),
                "Several remote items share this name, using the first"
            );
        }
        Ok(list.files.into_iter().next().map(|item| item.id))
    }

    /// Open a resumable upload session and return its URI
    async fn start_session(
        &self,
        method: Method,
        url: &str,
        metadata: &serde_json::Value,
        fields: &str,
        total: u64,
    ) -> Result<String, DriveError> {
        let request = self
            .authorized(method, url)
            .await?
            .query(&[("uploadType", "resumable"), ("fields", fields)])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", total.to_string())
            .json(metadata);

        let response = check_status(self.dispatch(request).await?).await?;
        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                DriveError::InvalidResponse("resumable session response has no Location".into())
            })?;
        debug!(total, "Resumable upload session opened");
        Ok(session)
    }

    /// Send `content` to an open session, one chunk per request
    async fn upload_chunks(
        &self,
        session: &str,
        content: &UploadSource,
    ) -> Result<CreatedItem, DriveError> {
        let total = content.len();
        let chunk_size = self.limits.chunk_size.max(1);
        let mut reader = ChunkReader::open(content).await?;
        let mut offset = 0u64;

        loop {
            if offset >= total {
                return Err(DriveError::UploadStalled { offset });
            }
            let len = chunk_size.min(total - offset);
            let end = offset + len - 1;
            let chunk = reader.read(offset, len).await?;

            let request = self
                .authorized(Method::PUT, session)
                .await?
                .header(CONTENT_RANGE, format!("bytes {offset}-{end}/{total}"))
                .body(chunk);
            let response = self.dispatch(request).await?;

            if response.status() != StatusCode::PERMANENT_REDIRECT {
                let response = check_status(response).await?;
                debug!(total, "Resumable upload complete");
                return Ok(response.json::<CreatedItem>().await?);
            }

            let committed = committed_bytes(&response).unwrap_or(0);
            debug!(offset, end, committed, total, "Chunk acknowledged");
            if committed <= offset || committed > total {
                return Err(DriveError::UploadStalled { offset });
            }
            offset = committed;
        }
    }
}

/// Reads the pieces of an upload, from memory or from disk
enum ChunkReader<'a> {
    Memory(&'a [u8]),
    File(tokio::fs::File),
}

impl<'a> ChunkReader<'a> {
    async fn open(content: &'a UploadSource) -> Result<Self, DriveError> {
        match content {
            UploadSource::Memory(bytes) => Ok(ChunkReader::Memory(bytes.as_slice())),
            UploadSource::File { path, .. } => {
                Ok(ChunkReader::File(tokio::fs::File::open(path).await?))
            }
        }
    }

    async fn read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, DriveError> {
        match self {
            ChunkReader::Memory(bytes) => {
                let range = usize::try_from(offset).ok().zip(usize::try_from(offset + len).ok());
                range
                    .and_then(|(start, end)| bytes.get(start..end))
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| {
                        DriveError::Source(std::io::ErrorKind::UnexpectedEof.into())
                    })
            }
            ChunkReader::File(file) => {
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

/// Whole content of a simple upload
async fn whole_body(content: &UploadSource) -> Result<Cow<'_, [u8]>, DriveError> {
    match content {
        UploadSource::Memory(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
        UploadSource::File { path, .. } => Ok(Cow::Owned(tokio::fs::read(path).await?)),
    }
}

/// Bytes the server holds after a `308`, from `Range: bytes=0-N`
fn committed_bytes(response: &Response) -> Option<u64> {
    let range = response.headers().get(RANGE)?.to_str().ok()?;
    parse_committed_range(range)
}

fn parse_committed_range(range: &str) -> Option<u64> {
    let (_, end) = range.strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse::<u64>().ok().map(|end| end + 1)
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Quote a value for a Drive search query
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn child_query(parent: &str, name: &str, folders: bool) -> String {
    let mime = if folders {
        format!("mimeType = '{FOLDER_MIME_TYPE}'")
    } else {
        format!("mimeType != '{FOLDER_MIME_TYPE}'")
    };
    format!(
        "'{}' in parents and name = '{}' and {} and trashed = false",
        escape_query_value(parent),
        escape_query_value(name),
        mime
    )
}

/// Body for a `multipart/related` upload: JSON metadata then raw content
fn multipart_body(boundary: &str, metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Map a non-success response onto [`DriveError`]
async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let text = response.text().await.unwrap_or_default();
    let (message, reasons): (String, Vec<String>) = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(env) => (
            env.error.message,
            env.error.errors.into_iter().map(|e| e.reason).collect(),
        ),
        Err(_) => (text, Vec::new()),
    };

    debug!(status = status.as_u16(), %message, ?reasons, "Drive request failed");
    Err(classify(status, message, &reasons, retry_after))
}

fn classify(
    status: StatusCode,
    message: String,
    reasons: &[String],
    retry_after: Option<std::time::Duration>,
) -> DriveError {
    match status {
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => DriveError::RateLimited { retry_after },
        StatusCode::FORBIDDEN if reasons.iter().any(|r| is_rate_limit_reason(r)) => {
            DriveError::RateLimited { retry_after }
        }
        StatusCode::FORBIDDEN => DriveError::Forbidden(message),
        StatusCode::NOT_FOUND => DriveError::NotFound(message),
        s if s.is_server_error() => DriveError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => DriveError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn require_id(item: CreatedItem, what: &str) -> Result<String, DriveError> {
    item.id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DriveError::InvalidResponse(format!("{what} response has no id")))
}

fn invalid_id(err: impl std::fmt::Display) -> RemoteError {
    RemoteError::Rejected(format!("Drive returned an unusable id: {err}"))
}

#[async_trait::async_trait]
impl IRemoteStore for DriveClient {
    #[tracing::instrument(skip(self), fields(parent = %parent))]
    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, RemoteError> {
        let url = format!("{}/files", self.api_base);
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent.as_str()],
        });
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&[("fields", "id")])
            .json(&metadata);

        let created: CreatedItem = self.send(request).await?;
        let id = require_id(created, "create folder")?;
        debug!(name, id = %id, "Folder created");
        FolderId::new(id).map_err(invalid_id)
    }

    #[tracing::instrument(skip(self, content), fields(parent = %parent, bytes = content.len()))]
    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        content: &UploadSource,
    ) -> Result<FileId, RemoteError> {
        let url = format!("{}/files", self.upload_base);
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent.as_str()],
        });

        let created: CreatedItem = if self.limits.is_resumable(content.len()) {
            let session = self
                .start_session(Method::POST, &url, &metadata, "id", content.len())
                .await?;
            self.upload_chunks(&session, content).await?
        } else {
            let boundary = format!("cloudmirror-{}", uuid::Uuid::new_v4().simple());
            let body = multipart_body(&boundary, &metadata, &whole_body(content).await?);
            let request = self
                .authorized(Method::POST, &url)
                .await?
                .query(&[("uploadType", "multipart"), ("fields", "id")])
                .header(
                    CONTENT_TYPE,
                    format!("multipart/related; boundary={boundary}"),
                )
                .body(body);
            self.send(request).await?
        };

        let id = require_id(created, "create file")?;
        debug!(name, id = %id, "File created");
        FileId::new(id).map_err(invalid_id)
    }

    #[tracing::instrument(skip(self, content), fields(file = %file, bytes = content.len()))]
    async fn update_file_content(
        &self,
        file: &FileId,
        content: &UploadSource,
    ) -> Result<RevisionId, RemoteError> {
        let url = format!("{}/files/{}", self.upload_base, file.as_str());

        let updated: CreatedItem = if self.limits.is_resumable(content.len()) {
            let session = self
                .start_session(
                    Method::PATCH,
                    &url,
                    &serde_json::json!({}),
                    "id,version",
                    content.len(),
                )
                .await?;
            self.upload_chunks(&session, content).await?
        } else {
            let body = whole_body(content).await?.into_owned();
            let request = self
                .authorized(Method::PATCH, &url)
                .await?
                .query(&[("uploadType", "media"), ("fields", "id,version")])
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body);
            self.send(request).await?
        };

        let revision = updated
            .version
            .or(updated.id)
            .unwrap_or_else(|| file.as_str().to_string());
        Ok(RevisionId::new(revision))
    }

    async fn find_folder(
        &self,
        parent: &FolderId,
        name: &str,
    ) -> Result<Option<FolderId>, RemoteError> {
        match self.find_child(parent.as_str(), name, true).await? {
            Some(id) => Ok(Some(FolderId::new(id).map_err(invalid_id)?)),
            None => Ok(None),
        }
    }

    async fn find_file(&self, parent: &FolderId, name: &str) -> Result<Option<FileId>, RemoteError> {
        match self.find_child(parent.as_str(), name, false).await? {
            Some(id) => Ok(Some(FileId::new(id).map_err(invalid_id)?)),
            None => Ok(None),
        }
    }
}
