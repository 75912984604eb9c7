//! FolderResolver against the SQLite store

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cloudmirror_core::domain::{FolderId, RelativePath, RemoteFolderRef};
use cloudmirror_core::ports::ISyncStateStore;
use cloudmirror_sync::resolver::FolderResolver;
use cloudmirror_sync::retry::RetryPolicy;

use crate::common::*;

fn resolver(
    store: Arc<dyn ISyncStateStore>,
    remote: Arc<RecordingRemoteStore>,
    adopt_existing: bool,
) -> FolderResolver {
    FolderResolver::new(
        store,
        remote,
        FolderId::new(ROOT_FOLDER.to_string()).unwrap(),
        RetryPolicy::no_retry(Duration::from_secs(5)),
        adopt_existing,
    )
}

#[tokio::test]
async fn test_root_resolves_without_calls() {
    let remote = RecordingRemoteStore::new();
    let resolver = resolver(Arc::new(memory_store().await), remote.clone(), true);

    let id = resolver
        .resolve(&RelativePath::root(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(id.as_str(), ROOT_FOLDER);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_second_resolution_uses_stored_refs() {
    let remote = RecordingRemoteStore::new();
    let store = Arc::new(memory_store().await);
    let resolver = resolver(store.clone(), remote.clone(), false);
    let cancel = CancellationToken::new();

    let first = resolver.resolve(&rel("a/b"), &cancel).await.unwrap();
    assert_eq!(remote.calls().len(), 2);

    remote.clear_calls();
    let second = resolver.resolve(&rel("a/b"), &cancel).await.unwrap();

    assert_eq!(first, second);
    assert!(remote.calls().is_empty());
    assert_eq!(store.list_folder_refs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sibling_reuses_shared_ancestor() {
    let remote = RecordingRemoteStore::new();
    let resolver = resolver(Arc::new(memory_store().await), remote.clone(), false);
    let cancel = CancellationToken::new();

    resolver.resolve(&rel("a/b"), &cancel).await.unwrap();
    remote.clear_calls();
    resolver.resolve(&rel("a/c"), &cancel).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![RemoteCall::CreateFolder {
            parent: "folder-1".into(),
            name: "c".into()
        }]
    );
}

#[tokio::test]
async fn test_preexisting_ref_skips_remote() {
    let remote = RecordingRemoteStore::new();
    let store = Arc::new(memory_store().await);
    store
        .put_folder_ref(&RemoteFolderRef::new(
            rel("notes"),
            FolderId::new("known-notes".to_string()).unwrap(),
        ))
        .await
        .unwrap();
    let resolver = resolver(store, remote.clone(), true);

    let id = resolver
        .resolve(&rel("notes"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(id.as_str(), "known-notes");
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_adoption_finds_before_creating() {
    let remote = RecordingRemoteStore::new();
    remote.add_existing_folder(ROOT_FOLDER, "notes", "drive-notes");
    let store = Arc::new(memory_store().await);
    let resolver = resolver(store.clone(), remote.clone(), true);

    let id = resolver
        .resolve(&rel("notes/archive"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::FindFolder {
                parent: ROOT_FOLDER.into(),
                name: "notes".into()
            },
            RemoteCall::FindFolder {
                parent: "drive-notes".into(),
                name: "archive".into()
            },
            RemoteCall::CreateFolder {
                parent: "drive-notes".into(),
                name: "archive".into()
            },
        ]
    );
    assert_eq!(id.as_str(), "folder-1");
    let stored = store.get_folder_ref(&rel("notes")).await.unwrap().unwrap();
    assert_eq!(stored.folder_id().as_str(), "drive-notes");
}
