//! Local tree entries observed during a scan

use std::path::PathBuf;
use std::time::SystemTime;

use super::newtypes::RelativePath;

/// A file or directory found under the mount root
///
/// Entries live only for the duration of a cycle. The content fingerprint
/// is not stored here; it is computed from the bytes that get uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub relative_path: RelativePath,
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl LocalEntry {
    pub fn directory(relative_path: RelativePath, absolute_path: PathBuf) -> Self {
        Self {
            relative_path,
            absolute_path,
            is_directory: true,
            modified: None,
            size: 0,
        }
    }

    pub fn file(
        relative_path: RelativePath,
        absolute_path: PathBuf,
        modified: Option<SystemTime>,
        size: u64,
    ) -> Self {
        Self {
            relative_path,
            absolute_path,
            is_directory: false,
            modified,
            size,
        }
    }

    /// Directory the entry lives in, relative to the mount root
    pub fn parent_dir(&self) -> RelativePath {
        self.relative_path.parent().unwrap_or_else(RelativePath::root)
    }

    /// Final path segment
    pub fn name(&self) -> &str {
        self.relative_path.file_name().unwrap_or_default()
    }
}
