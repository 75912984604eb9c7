//! Path-to-folder resolution
//!
//! Maps a local directory (relative to the mount root) to the remote folder
//! that mirrors it. Resolution walks the path outer-to-inner; each prefix is
//! looked up in the state store first and only created remotely when no
//! reference exists. A newly created folder is persisted before its children
//! are resolved, so a second resolution never creates it again.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cloudmirror_core::domain::{FolderId, RelativePath, RemoteFolderRef};
use cloudmirror_core::ports::{IRemoteStore, ISyncStateStore};

use crate::retry::{call_with_retry, RetryPolicy};
use crate::SyncError;

pub struct FolderResolver {
    store: Arc<dyn ISyncStateStore>,
    remote: Arc<dyn IRemoteStore>,
    root: FolderId,
    retry: RetryPolicy,
    adopt_existing: bool,
}

impl FolderResolver {
    pub fn new(
        store: Arc<dyn ISyncStateStore>,
        remote: Arc<dyn IRemoteStore>,
        root: FolderId,
        retry: RetryPolicy,
        adopt_existing: bool,
    ) -> Self {
        Self {
            store,
            remote,
            root,
            retry,
            adopt_existing,
        }
    }

    /// The folder mirroring the mount root
    pub fn root(&self) -> &FolderId {
        &self.root
    }

    /// Return the remote folder for `dir`, creating missing ancestors
    ///
    /// The root path resolves to the configured root folder without any
    /// lookup.
    pub async fn resolve(
        &self,
        dir: &RelativePath,
        cancel: &CancellationToken,
    ) -> Result<FolderId, SyncError> {
        if dir.is_root() {
            return Ok(self.root.clone());
        }

        let mut parent = self.root.clone();

        for prefix in dir.prefixes() {
            let existing = self
                .store
                .get_folder_ref(&prefix)
                .await
                .map_err(SyncError::store)?;

            parent = match existing {
                Some(folder) => folder.folder_id().clone(),
                None => {
                    let folder_id = self.obtain(&parent, &prefix, cancel).await?;
                    let folder = RemoteFolderRef::new(prefix.clone(), folder_id.clone());
                    if let Err(err) = self.store.put_folder_ref(&folder).await {
                        error!(
                            path = %prefix,
                            folder_id = %folder_id,
                            error = %err,
                            "Remote folder exists but its reference could not be saved"
                        );
                        return Err(SyncError::store(err));
                    }
                    folder_id
                }
            };
        }

        Ok(parent)
    }

    /// Adopt an existing remote folder or create a new one
    async fn obtain(
        &self,
        parent: &FolderId,
        path: &RelativePath,
        cancel: &CancellationToken,
    ) -> Result<FolderId, SyncError> {
        let name = path.file_name().unwrap_or_default();
        let remote = self.remote.as_ref();

        if self.adopt_existing {
            let found = call_with_retry("find_folder", &self.retry, cancel, move || {
                remote.find_folder(parent, name)
            })
            .await
            .map_err(|e| SyncError::remote("find_folder", path, e))?;

            if let Some(folder_id) = found {
                info!(path = %path, folder_id = %folder_id, "Adopted existing remote folder");
                return Ok(folder_id);
            }
        }

        let folder_id = call_with_retry("create_folder", &self.retry, cancel, move || {
            remote.create_folder(parent, name)
        })
        .await
        .map_err(|e| SyncError::remote("create_folder", path, e))?;

        info!(path = %path, folder_id = %folder_id, "Created remote folder");
        debug!(parent = %parent, name, "Folder created under parent");
        Ok(folder_id)
    }
}
