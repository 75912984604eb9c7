//! cloudmirror core - domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain values** - `RelativePath`, `FolderId`, `FileId`, `Fingerprint`
//! - **Domain entities** - `SyncRecord`, `RemoteFolderRef`, `SessionLog`, `CycleReport`
//! - **Port definitions** - `IRemoteStore`, `ISyncStateStore`, `ISessionProvider`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module holds pure data types with no I/O. Ports define the
//! traits that adapter crates implement (SQLite state store, Drive client)
//! and that the sync engine consumes.

pub mod config;
pub mod domain;
pub mod ports;
