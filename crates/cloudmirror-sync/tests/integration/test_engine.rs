//! Full-cycle behaviour of SyncEngine

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cloudmirror_core::config::TransferLimits;
use cloudmirror_core::domain::{Fingerprint, SessionAction};
use cloudmirror_core::ports::{ISyncStateStore, RemoteError};
use cloudmirror_sync::retry::RetryPolicy;
use cloudmirror_sync::scanner::LocalScanner;
use cloudmirror_sync::{SyncEngine, SyncError};

use crate::common::*;

#[tokio::test]
async fn test_first_upload_creates_folder_then_file() {
    let dir = mount();
    write(dir.path(), "notes/a.txt", b"hello");
    let remote = RecordingRemoteStore::new();
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(false));

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::CreateFolder {
                parent: ROOT_FOLDER.into(),
                name: "notes".into()
            },
            RemoteCall::CreateFile {
                parent: "folder-1".into(),
                name: "a.txt".into()
            },
        ]
    );
    assert_eq!(outcome.report.uploaded, 1);
    assert_eq!(outcome.session_log.count(SessionAction::Uploaded), 1);
    assert_eq!(remote.content_of("file-2").unwrap(), b"hello");

    let record = store.get_record(&rel("notes/a.txt")).await.unwrap().unwrap();
    assert_eq!(record.remote_file_id().unwrap().as_str(), "file-2");
    assert_eq!(record.last_fingerprint(), Some(&Fingerprint::of(b"hello")));
    let folder = store.get_folder_ref(&rel("notes")).await.unwrap().unwrap();
    assert_eq!(folder.folder_id().as_str(), "folder-1");
}

#[tokio::test]
async fn test_second_cycle_without_changes_makes_no_calls() {
    let dir = mount();
    write(dir.path(), "a.txt", b"one");
    write(dir.path(), "notes/b.txt", b"two");
    write(dir.path(), "notes/deep/c.txt", b"three");
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(true),
    );
    let cancel = CancellationToken::new();

    let first = engine.run_once(&cancel).await.unwrap();
    assert_eq!(first.report.uploaded, 3);

    remote.clear_calls();
    let second = engine.run_once(&cancel).await.unwrap();

    assert!(remote.calls().is_empty());
    assert_eq!(second.report.skipped, 3);
    assert!(!second.report.changed_anything());
    assert!(second.session_log.is_empty());
}

#[tokio::test]
async fn test_restart_resumes_without_reuploading() {
    let dir = mount();
    let db = tempfile::tempdir().unwrap();
    let db_path = db.path().join("state.db");
    write(dir.path(), "notes/a.txt", b"alpha");
    write(dir.path(), "notes/b.txt", b"beta");

    let remote = RecordingRemoteStore::new();
    {
        let engine = engine(
            dir.path(),
            Arc::new(file_store(&db_path).await),
            remote.clone(),
            settings(false),
        );
        let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.report.uploaded, 2);
    }

    remote.clear_calls();
    let restarted = engine(
        dir.path(),
        Arc::new(file_store(&db_path).await),
        remote.clone(),
        settings(false),
    );
    let outcome = restarted.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.report.uploaded, 0);
    assert_eq!(outcome.report.updated, 0);
    assert_eq!(outcome.report.skipped, 2);
    assert!(remote.mutations().is_empty());
}

#[tokio::test]
async fn test_changed_content_updates_in_place() {
    let dir = mount();
    write(dir.path(), "notes/a.txt", b"v1");
    let remote = RecordingRemoteStore::new();
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(false));
    let cancel = CancellationToken::new();
    engine.run_once(&cancel).await.unwrap();

    write(dir.path(), "notes/a.txt", b"v2 with more bytes");
    remote.clear_calls();
    let outcome = engine.run_once(&cancel).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![RemoteCall::UpdateFile {
            file_id: "file-2".into()
        }]
    );
    assert_eq!(outcome.report.updated, 1);
    assert_eq!(outcome.session_log.count(SessionAction::Updated), 1);
    assert_eq!(remote.content_of("file-2").unwrap(), b"v2 with more bytes");

    let record = store.get_record(&rel("notes/a.txt")).await.unwrap().unwrap();
    assert_eq!(record.remote_file_id().unwrap().as_str(), "file-2");
    assert_eq!(
        record.last_fingerprint(),
        Some(&Fingerprint::of(b"v2 with more bytes"))
    );
}

#[tokio::test]
async fn test_failed_file_does_not_block_others_and_is_retried() {
    let dir = mount();
    write(dir.path(), "a.txt", b"fine");
    write(dir.path(), "b.txt", b"refused");
    let remote = RecordingRemoteStore::new();
    remote.fail_name("b.txt");
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(false));
    let cancel = CancellationToken::new();

    let first = engine.run_once(&cancel).await.unwrap();
    assert_eq!(first.report.uploaded, 1);
    assert_eq!(first.report.failed, 1);
    assert_eq!(first.report.errors.len(), 1);
    assert!(first.report.errors[0].contains("b.txt"));
    assert!(store.get_record(&rel("b.txt")).await.unwrap().is_none());

    remote.heal_name("b.txt");
    remote.clear_calls();
    let second = engine.run_once(&cancel).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![RemoteCall::CreateFile {
            parent: ROOT_FOLDER.into(),
            name: "b.txt".into()
        }]
    );
    assert_eq!(second.report.uploaded, 1);
    assert_eq!(second.report.skipped, 1);
    assert_eq!(second.report.failed, 0);
}

#[tokio::test]
async fn test_file_vanishing_mid_cycle_fails_alone() {
    let dir = mount();
    write(dir.path(), "a.txt", b"first");
    write(dir.path(), "b.txt", b"deleted before it is read");
    write(dir.path(), "c.txt", b"third");
    let remote = RecordingRemoteStore::new();
    remote.delete_when_creating("a.txt", dir.path().join("b.txt"));
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(false));

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.report.uploaded, 2);
    assert_eq!(outcome.report.failed, 1);
    assert!(outcome.report.errors[0].starts_with("b.txt: Local I/O error"));
    assert!(store.get_record(&rel("b.txt")).await.unwrap().is_none());
    assert!(store.get_record(&rel("c.txt")).await.unwrap().is_some());
    assert!(!remote.mutations().iter().any(|call| matches!(
        call,
        RemoteCall::CreateFile { name, .. } if name == "b.txt"
    )));
}

#[tokio::test]
async fn test_large_file_is_uploaded_from_disk() {
    let dir = mount();
    let body: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
    write(dir.path(), "disk.img", &body);
    write(dir.path(), "note.txt", b"small");
    let remote = RecordingRemoteStore::new();
    let store = Arc::new(memory_store().await);
    let mut settings = settings(false);
    settings.transfer = TransferLimits {
        resumable_threshold: 1024,
        chunk_size: 1024,
    };
    let scanner = LocalScanner::new(dir.path(), Vec::new(), &[])
        .unwrap()
        .with_stream_threshold(1024);
    let engine = SyncEngine::new(scanner, store.clone(), remote.clone(), settings);
    let cancel = CancellationToken::new();

    let first = engine.run_once(&cancel).await.unwrap();
    assert_eq!(first.report.uploaded, 2);
    assert!(remote.was_streamed("file-1"));
    assert!(!remote.was_streamed("file-2"));
    assert_eq!(remote.content_of("file-1").unwrap(), body);

    let record = store.get_record(&rel("disk.img")).await.unwrap().unwrap();
    assert_eq!(record.last_fingerprint(), Some(&Fingerprint::of(&body)));

    remote.clear_calls();
    let second = engine.run_once(&cancel).await.unwrap();
    assert_eq!(second.report.skipped, 2);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_chunked_upload_deadline_covers_every_request() {
    let dir = mount();
    write(dir.path(), "big.bin", &[7u8; 40]);
    write(dir.path(), "small.txt", b"tiny");
    let remote = RecordingRemoteStore::new();
    remote.set_delay(Duration::from_millis(300));
    let mut settings = settings(false);
    settings.retry = RetryPolicy::no_retry(Duration::from_millis(200));
    // 40 bytes -> session request plus three chunks
    settings.transfer = TransferLimits {
        resumable_threshold: 16,
        chunk_size: 16,
    };
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings);

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.report.uploaded, 1);
    assert_eq!(outcome.report.failed, 1);
    assert!(store.get_record(&rel("big.bin")).await.unwrap().is_some());
    assert!(store.get_record(&rel("small.txt")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_nested_folders_created_once_outer_to_inner() {
    let dir = mount();
    write(dir.path(), "projects/x/three.txt", b"3");
    write(dir.path(), "projects/x/y/one.txt", b"1");
    write(dir.path(), "projects/x/y/two.txt", b"2");
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.report.uploaded, 3);

    let folders: Vec<(String, String)> = remote
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RemoteCall::CreateFolder { parent, name } => Some((parent, name)),
            _ => None,
        })
        .collect();
    assert_eq!(
        folders,
        vec![
            (ROOT_FOLDER.to_string(), "projects".to_string()),
            ("folder-1".to_string(), "x".to_string()),
            ("folder-2".to_string(), "y".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_directory_created_before_its_files() {
    let dir = mount();
    write(dir.path(), "top.txt", b"t");
    write(dir.path(), "notes/inner.txt", b"i");
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );
    engine.run_once(&CancellationToken::new()).await.unwrap();

    let calls = remote.calls();
    let folder_at = calls
        .iter()
        .position(|c| matches!(c, RemoteCall::CreateFolder { name, .. } if name == "notes"))
        .unwrap();
    let inner_at = calls
        .iter()
        .position(|c| matches!(c, RemoteCall::CreateFile { name, .. } if name == "inner.txt"))
        .unwrap();
    assert!(folder_at < inner_at);
}

#[tokio::test]
async fn test_empty_directories_are_not_mirrored() {
    let dir = mount();
    std::fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert!(remote.calls().is_empty());
    assert_eq!(outcome.report.total(), 0);
}

#[tokio::test]
async fn test_unauthorized_aborts_cycle() {
    let dir = mount();
    write(dir.path(), "a.txt", b"x");
    write(dir.path(), "b.txt", b"y");
    let remote = RecordingRemoteStore::new();
    remote.force_error(RemoteError::Unauthorized("token expired".into()));
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );

    let result = engine.run_once(&CancellationToken::new()).await;

    assert!(matches!(result, Err(SyncError::AuthExpired(_))));
    assert_eq!(remote.calls().len(), 1);
}

#[tokio::test]
async fn test_store_failure_after_remote_success_aborts() {
    let dir = mount();
    write(dir.path(), "a.txt", b"x");
    let remote = RecordingRemoteStore::new();
    let store = FlakyStateStore::new(memory_store().await);
    store.fail_writes();
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(false));

    let result = engine.run_once(&CancellationToken::new()).await;

    assert!(matches!(result, Err(SyncError::StateStore(ref m)) if m.contains("database is locked")));
    assert_eq!(remote.mutations().len(), 1);
    assert!(store.get_record(&rel("a.txt")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_created_before_store_failure_is_adopted_next_cycle() {
    let dir = mount();
    write(dir.path(), "a.txt", b"x");
    let remote = RecordingRemoteStore::new();
    let store = FlakyStateStore::new(memory_store().await);
    store.fail_writes();
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(true));
    assert!(engine.run_once(&CancellationToken::new()).await.is_err());

    store.heal_writes();
    remote.clear_calls();
    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        remote.mutations(),
        vec![RemoteCall::UpdateFile {
            file_id: "file-1".into()
        }]
    );
    assert_eq!(outcome.report.updated, 1);
    let record = store.get_record(&rel("a.txt")).await.unwrap().unwrap();
    assert_eq!(record.remote_file_id().unwrap().as_str(), "file-1");
}

#[tokio::test]
async fn test_slow_remote_call_counts_as_failure() {
    let dir = mount();
    write(dir.path(), "a.txt", b"x");
    let remote = RecordingRemoteStore::new();
    remote.set_delay(Duration::from_secs(2));
    let mut settings = settings(false);
    settings.retry = RetryPolicy::no_retry(Duration::from_millis(50));
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings);

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.report.failed, 1);
    assert_eq!(outcome.report.uploaded, 0);
    assert!(store.get_record(&rel("a.txt")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_before_start_touches_nothing() {
    let dir = mount();
    write(dir.path(), "a.txt", b"x");
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = engine.run_once(&cancel).await.unwrap();

    assert!(outcome.report.cancelled);
    assert_eq!(outcome.report.total(), 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_missing_mount_is_an_empty_cycle() {
    let dir = mount();
    let missing = dir.path().join("not-mounted");
    let remote = RecordingRemoteStore::new();
    let engine = engine(
        &missing,
        Arc::new(memory_store().await),
        remote.clone(),
        settings(false),
    );

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.report.total(), 0);
    assert_eq!(outcome.report.failed, 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_existing_remote_items_are_adopted() {
    let dir = mount();
    write(dir.path(), "notes/a.txt", b"local copy");
    let remote = RecordingRemoteStore::new();
    remote.add_existing_folder(ROOT_FOLDER, "notes", "existing-notes");
    remote.add_existing_file("existing-notes", "a.txt", "existing-a");
    let store = Arc::new(memory_store().await);
    let engine = engine(dir.path(), store.clone(), remote.clone(), settings(true));

    let outcome = engine.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        remote.mutations(),
        vec![RemoteCall::UpdateFile {
            file_id: "existing-a".into()
        }]
    );
    assert_eq!(outcome.report.updated, 1);
    assert_eq!(remote.content_of("existing-a").unwrap(), b"local copy");

    let record = store.get_record(&rel("notes/a.txt")).await.unwrap().unwrap();
    assert_eq!(record.remote_file_id().unwrap().as_str(), "existing-a");
    let folder = store.get_folder_ref(&rel("notes")).await.unwrap().unwrap();
    assert_eq!(folder.folder_id().as_str(), "existing-notes");
}

#[tokio::test]
async fn test_trust_mtime_skips_reading_unchanged_files() {
    let dir = mount();
    write(dir.path(), "a.txt", b"stable");
    let remote = RecordingRemoteStore::new();
    let mut settings = settings(false);
    settings.trust_mtime = true;
    let engine = engine(
        dir.path(),
        Arc::new(memory_store().await),
        remote.clone(),
        settings,
    );
    let cancel = CancellationToken::new();

    engine.run_once(&cancel).await.unwrap();
    remote.clear_calls();
    let second = engine.run_once(&cancel).await.unwrap();

    assert_eq!(second.report.skipped, 1);
    assert!(remote.calls().is_empty());
}
