//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the sync engine depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Remote folder/file creation and content updates
//! - [`ISyncStateStore`] - Durable folder references and sync records
//! - [`ISessionProvider`] - Access tokens for the remote store

pub mod remote_store;
pub mod session;
pub mod state_store;

pub use remote_store::{IRemoteStore, RemoteError, UploadSource};
pub use session::{ISessionProvider, Tokens};
pub use state_store::{ISyncStateStore, RecordFilter, StoreCounts};
