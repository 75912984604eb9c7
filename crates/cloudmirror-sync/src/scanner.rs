//! Local tree scanning
//!
//! [`LocalScanner`] walks the mount root depth-first and returns the
//! entries in the order the engine processes them: a directory first, then
//! the files directly inside it (by name), then each subdirectory (by name)
//! recursively. Symlinks and special files are skipped.
//!
//! `sync.exclude` globs are matched against the names of regular files
//! only. A directory whose name matches a pattern is still walked, and the
//! files inside it are judged by their own names.
//!
//! Unreadable directories do not stop the walk; they are returned in
//! [`Scan::errors`] so the cycle can count them as failures.
//!
//! [`LocalScanner::load`] keeps files up to the stream threshold in memory.
//! Larger ones are fingerprinted in a streaming pass and handed on as a
//! path, so memory use does not grow with file size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use cloudmirror_core::config::{SyncConfig, TransferLimits};
use cloudmirror_core::domain::{
    DomainError, Fingerprint, FingerprintHasher, LocalEntry, RelativePath,
};
use cloudmirror_core::ports::UploadSource;

use crate::SyncError;

/// Result of one tree walk
#[derive(Debug, Default)]
pub struct Scan {
    /// Entries in processing order
    pub entries: Vec<LocalEntry>,
    /// Directories that could not be listed
    pub errors: Vec<SyncError>,
    /// False when the mount root itself is missing
    pub root_exists: bool,
}

impl Scan {
    pub fn files(&self) -> impl Iterator<Item = &LocalEntry> {
        self.entries.iter().filter(|e| !e.is_directory)
    }
}

/// Read buffer for streaming fingerprints
const HASH_BUFFER_BYTES: usize = 64 * 1024;

/// Walks the mount tree
pub struct LocalScanner {
    root: PathBuf,
    subdirectories: Vec<String>,
    exclude: Vec<glob::Pattern>,
    stream_threshold: u64,
}

impl LocalScanner {
    /// Create a scanner over `root`
    ///
    /// # Errors
    /// Returns [`DomainError::ValidationFailed`] for malformed glob patterns
    pub fn new(
        root: impl Into<PathBuf>,
        subdirectories: Vec<String>,
        exclude: &[String],
    ) -> Result<Self, SyncError> {
        let exclude = exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    DomainError::ValidationFailed(format!("invalid exclude pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            subdirectories,
            exclude,
            stream_threshold: TransferLimits::default().resumable_threshold,
        })
    }

    /// Files larger than `bytes` are loaded as [`UploadSource::File`]
    pub fn with_stream_threshold(mut self, bytes: u64) -> Self {
        self.stream_threshold = bytes;
        self
    }

    pub fn from_config(sync: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(
            sync.mount_path.clone(),
            sync.subdirectories.clone(),
            &sync.exclude,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(name))
    }

    /// Walk the tree under the mount root
    pub async fn scan(&self) -> Scan {
        let mut scan = Scan::default();

        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => scan.root_exists = true,
            Ok(_) => {
                warn!(root = %self.root.display(), "Mount path is not a directory");
                return scan;
            }
            Err(err) => {
                warn!(root = %self.root.display(), error = %err, "Mount path is not accessible");
                return scan;
            }
        }

        let root = RelativePath::root();
        self.walk_directory(&self.root, &root, &mut scan).await;

        debug!(
            entries = scan.entries.len(),
            errors = scan.errors.len(),
            "Local scan complete"
        );
        scan
    }

    /// Recursively list `dir`, appending to `scan`
    fn walk_directory<'a>(
        &'a self,
        dir: &'a Path,
        relative: &'a RelativePath,
        scan: &'a mut Scan,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut reader = match tokio::fs::read_dir(dir).await {
                Ok(reader) => reader,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Cannot list directory");
                    scan.errors.push(SyncError::local_io(dir, err));
                    return;
                }
            };

            let mut files = Vec::new();
            let mut subdirs = Vec::new();

            loop {
                let entry = match reader.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        scan.errors.push(SyncError::local_io(dir, err));
                        break;
                    }
                };

                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(raw) => {
                        warn!(dir = %dir.display(), name = ?raw, "Skipping non UTF-8 name");
                        continue;
                    }
                };

                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(err) => {
                        scan.errors.push(SyncError::local_io(entry.path(), err));
                        continue;
                    }
                };

                if file_type.is_dir() {
                    if relative.is_root()
                        && !self.subdirectories.is_empty()
                        && !self.subdirectories.contains(&name)
                    {
                        continue;
                    }
                    subdirs.push((name, entry.path()));
                } else if file_type.is_file() {
                    if relative.is_root() && !self.subdirectories.is_empty() {
                        continue;
                    }
                    if self.is_excluded(&name) {
                        debug!(name = %name, "Skipping excluded file");
                        continue;
                    }
                    files.push((name, entry.path()));
                } else {
                    debug!(path = %entry.path().display(), "Skipping symlink or special file");
                }
            }

            files.sort_by(|a, b| a.0.cmp(&b.0));
            subdirs.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, path) in files {
                let rel = match relative.join(&name) {
                    Ok(rel) => rel,
                    Err(err) => {
                        scan.errors.push(err.into());
                        continue;
                    }
                };
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => scan.entries.push(LocalEntry::file(
                        rel,
                        path,
                        meta.modified().ok(),
                        meta.len(),
                    )),
                    Err(err) => scan.errors.push(SyncError::local_io(path, err)),
                }
            }

            for (name, path) in subdirs {
                let rel = match relative.join(&name) {
                    Ok(rel) => rel,
                    Err(err) => {
                        scan.errors.push(err.into());
                        continue;
                    }
                };
                scan.entries
                    .push(LocalEntry::directory(rel.clone(), path.clone()));
                self.walk_directory(&path, &rel, scan).await;
            }
        })
    }

    /// Fingerprint a file and return what to upload
    ///
    /// Small files come back as [`UploadSource::Memory`] holding exactly
    /// the fingerprinted bytes. Larger files come back as
    /// [`UploadSource::File`]; if such a file changes between hashing and
    /// uploading, the stored fingerprint is the older one and the next
    /// cycle uploads it again.
    pub async fn load(&self, entry: &LocalEntry) -> Result<(UploadSource, Fingerprint), SyncError> {
        let path = &entry.absolute_path;
        let io_err = |e: std::io::Error| SyncError::local_io(path, e);

        let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
        let size = file.metadata().await.map_err(io_err)?.len();

        if size <= self.stream_threshold {
            let mut content = Vec::with_capacity(size as usize);
            file.read_to_end(&mut content).await.map_err(io_err)?;
            let fingerprint = Fingerprint::of(&content);
            return Ok((UploadSource::Memory(content), fingerprint));
        }

        let mut hasher = FingerprintHasher::new();
        let mut buf = vec![0u8; HASH_BUFFER_BYTES];
        loop {
            let n = file.read(&mut buf).await.map_err(io_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let len = hasher.len();
        debug!(path = %entry.relative_path, bytes = len, "Streamed fingerprint of large file");
        let source = UploadSource::File {
            path: path.clone(),
            len,
        };
        Ok((source, hasher.finish()))
    }
}

// ============================================================================
// Fingerprint cache (trust_mtime)
// ============================================================================

/// Remembers fingerprints keyed by size and modification time
///
/// Only consulted when `sync.trust_mtime` is enabled; otherwise every file
/// is re-read each cycle.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    seen: HashMap<RelativePath, (SystemTime, u64, Fingerprint)>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached fingerprint if the entry's size and mtime are unchanged
    pub fn lookup(&self, entry: &LocalEntry) -> Option<&Fingerprint> {
        let modified = entry.modified?;
        match self.seen.get(&entry.relative_path) {
            Some((m, size, fp)) if *m == modified && *size == entry.size => Some(fp),
            _ => None,
        }
    }

    pub fn remember(&mut self, entry: &LocalEntry, fingerprint: Fingerprint) {
        if let Some(modified) = entry.modified {
            self.seen
                .insert(entry.relative_path.clone(), (modified, entry.size, fingerprint));
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
