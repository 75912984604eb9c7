//! Domain entities and value types
//!
//! - Newtypes for relative paths, remote identifiers and fingerprints
//! - Sync records and remote folder references (persisted)
//! - Local entries, session logs and cycle reports (per cycle)
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod newtypes;
pub mod record;
pub mod report;
pub mod session_log;

// Re-export commonly used types
pub use entry::LocalEntry;
pub use errors::DomainError;
pub use newtypes::*;
pub use record::{RemoteFolderRef, SyncRecord};
pub use report::CycleReport;
pub use session_log::{SessionAction, SessionEntry, SessionLog};
