//! Shared fakes and fixtures for engine tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use cloudmirror_cache::{DatabasePool, SqliteStateStore};
use cloudmirror_core::domain::{
    FileId, FolderId, RelativePath, RemoteFolderRef, RevisionId, SyncRecord,
};
use cloudmirror_core::config::TransferLimits;
use cloudmirror_core::ports::{
    IRemoteStore, ISyncStateStore, RecordFilter, RemoteError, StoreCounts, UploadSource,
};
use cloudmirror_sync::engine::{EngineSettings, SyncEngine};
use cloudmirror_sync::retry::RetryPolicy;
use cloudmirror_sync::scanner::LocalScanner;

pub const ROOT_FOLDER: &str = "root-folder";

/// A call observed by [`RecordingRemoteStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateFolder { parent: String, name: String },
    CreateFile { parent: String, name: String },
    UpdateFile { file_id: String },
    FindFolder { parent: String, name: String },
    FindFile { parent: String, name: String },
}

impl RemoteCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::CreateFolder { .. } | RemoteCall::CreateFile { .. } | RemoteCall::UpdateFile { .. }
        )
    }
}

/// Remote store fake that records calls and hands out sequential ids
#[derive(Default)]
pub struct RecordingRemoteStore {
    calls: Mutex<Vec<RemoteCall>>,
    next_id: AtomicU32,
    /// File names whose create/update fails with `Rejected`
    failing_names: Mutex<HashSet<String>>,
    /// Error returned by every mutation when set
    forced_error: Mutex<Option<RemoteError>>,
    /// Calls hang this long before answering
    delay: Mutex<Option<Duration>>,
    /// (parent, name) -> id, visible to find_folder
    existing_folders: Mutex<HashMap<(String, String), String>>,
    /// (parent, name) -> id, visible to find_file; created files land here too
    existing_files: Mutex<HashMap<(String, String), String>>,
    /// file id -> last uploaded content
    contents: Mutex<HashMap<String, Vec<u8>>>,
    /// file ids whose last upload arrived as a path rather than bytes
    streamed: Mutex<HashSet<String>>,
    /// Creating the named file deletes the local path
    vanish_on_create: Mutex<HashMap<String, PathBuf>>,
}

impl RecordingRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_name(&self, name: &str) {
        self.failing_names.lock().unwrap().insert(name.to_string());
    }

    pub fn heal_name(&self, name: &str) {
        self.failing_names.lock().unwrap().remove(name);
    }

    pub fn force_error(&self, err: RemoteError) {
        *self.forced_error.lock().unwrap() = Some(err);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn add_existing_folder(&self, parent: &str, name: &str, id: &str) {
        self.existing_folders
            .lock()
            .unwrap()
            .insert((parent.to_string(), name.to_string()), id.to_string());
    }

    pub fn add_existing_file(&self, parent: &str, name: &str, id: &str) {
        self.existing_files
            .lock()
            .unwrap()
            .insert((parent.to_string(), name.to_string()), id.to_string());
    }

    pub fn content_of(&self, file_id: &str) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().get(file_id).cloned()
    }

    pub fn was_streamed(&self, file_id: &str) -> bool {
        self.streamed.lock().unwrap().contains(file_id)
    }

    /// When `name` is created, remove `victim` from the local disk
    pub fn delete_when_creating(&self, name: &str, victim: PathBuf) {
        self.vanish_on_create
            .lock()
            .unwrap()
            .insert(name.to_string(), victim);
    }

    /// Store what the engine handed over, reading file sources from disk
    fn keep(&self, file_id: &str, content: &UploadSource) -> Result<(), RemoteError> {
        let bytes = match content {
            UploadSource::Memory(bytes) => bytes.clone(),
            UploadSource::File { path, .. } => {
                self.streamed.lock().unwrap().insert(file_id.to_string());
                std::fs::read(path).map_err(|e| RemoteError::SourceUnreadable(e.to_string()))?
            }
        };
        self.contents
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes);
        Ok(())
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn gate(&self, name: &str) -> Result<(), RemoteError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.forced_error.lock().unwrap().clone() {
            return Err(err);
        }
        if self.failing_names.lock().unwrap().contains(name) {
            return Err(RemoteError::Rejected(format!("{name} refused")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for RecordingRemoteStore {
    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, RemoteError> {
        self.record(RemoteCall::CreateFolder {
            parent: parent.to_string(),
            name: name.to_string(),
        });
        self.gate(name).await?;
        Ok(FolderId::new(self.next("folder")).unwrap())
    }

    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        content: &UploadSource,
    ) -> Result<FileId, RemoteError> {
        self.record(RemoteCall::CreateFile {
            parent: parent.to_string(),
            name: name.to_string(),
        });
        let victim = self.vanish_on_create.lock().unwrap().remove(name);
        if let Some(victim) = victim {
            std::fs::remove_file(victim).unwrap();
        }
        self.gate(name).await?;
        let id = self.next("file");
        self.keep(&id, content)?;
        self.existing_files
            .lock()
            .unwrap()
            .insert((parent.to_string(), name.to_string()), id.clone());
        Ok(FileId::new(id).unwrap())
    }

    async fn update_file_content(
        &self,
        file: &FileId,
        content: &UploadSource,
    ) -> Result<RevisionId, RemoteError> {
        self.record(RemoteCall::UpdateFile {
            file_id: file.to_string(),
        });
        self.gate(file.as_str()).await?;
        self.keep(file.as_str(), content)?;
        Ok(RevisionId::new(self.next("rev")))
    }

    async fn find_folder(
        &self,
        parent: &FolderId,
        name: &str,
    ) -> Result<Option<FolderId>, RemoteError> {
        self.record(RemoteCall::FindFolder {
            parent: parent.to_string(),
            name: name.to_string(),
        });
        let found = self
            .existing_folders
            .lock()
            .unwrap()
            .get(&(parent.to_string(), name.to_string()))
            .cloned();
        Ok(found.map(|id| FolderId::new(id).unwrap()))
    }

    async fn find_file(&self, parent: &FolderId, name: &str) -> Result<Option<FileId>, RemoteError> {
        self.record(RemoteCall::FindFile {
            parent: parent.to_string(),
            name: name.to_string(),
        });
        let found = self
            .existing_files
            .lock()
            .unwrap()
            .get(&(parent.to_string(), name.to_string()))
            .cloned();
        Ok(found.map(|id| FileId::new(id).unwrap()))
    }
}

/// State store wrapper whose writes can be switched off
pub struct FlakyStateStore {
    inner: SqliteStateStore,
    fail_writes: AtomicBool,
}

impl FlakyStateStore {
    pub fn new(inner: SqliteStateStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn heal_writes(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ISyncStateStore for FlakyStateStore {
    async fn get_record(&self, path: &RelativePath) -> anyhow::Result<Option<SyncRecord>> {
        self.inner.get_record(path).await
    }

    async fn put_record(&self, record: &SyncRecord) -> anyhow::Result<()> {
        self.check()?;
        self.inner.put_record(record).await
    }

    async fn get_folder_ref(&self, path: &RelativePath) -> anyhow::Result<Option<RemoteFolderRef>> {
        self.inner.get_folder_ref(path).await
    }

    async fn put_folder_ref(&self, folder: &RemoteFolderRef) -> anyhow::Result<()> {
        self.check()?;
        self.inner.put_folder_ref(folder).await
    }

    async fn list_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<SyncRecord>> {
        self.inner.list_records(filter).await
    }

    async fn list_folder_refs(&self) -> anyhow::Result<Vec<RemoteFolderRef>> {
        self.inner.list_folder_refs().await
    }

    async fn counts(&self) -> anyhow::Result<StoreCounts> {
        self.inner.counts().await
    }
}

pub async fn memory_store() -> SqliteStateStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteStateStore::new(pool.pool().clone())
}

pub async fn file_store(db_path: &Path) -> SqliteStateStore {
    let pool = DatabasePool::new(db_path)
        .await
        .expect("Failed to open database file");
    SqliteStateStore::new(pool.pool().clone())
}

pub fn settings(adopt_existing: bool) -> EngineSettings {
    EngineSettings {
        root_folder: FolderId::new(ROOT_FOLDER.to_string()).unwrap(),
        retry: RetryPolicy::no_retry(Duration::from_secs(5)),
        adopt_existing,
        trust_mtime: false,
        transfer: TransferLimits::default(),
    }
}

pub fn engine(
    mount: &Path,
    store: Arc<dyn ISyncStateStore>,
    remote: Arc<dyn IRemoteStore>,
    settings: EngineSettings,
) -> SyncEngine {
    let scanner = LocalScanner::new(mount, Vec::new(), &[]).unwrap();
    SyncEngine::new(scanner, store, remote, settings)
}

/// Write `content` at `rel` under `root`, creating parents
pub fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn mount() -> TempDir {
    TempDir::new().unwrap()
}

pub fn rel(s: &str) -> RelativePath {
    s.parse().unwrap()
}
