//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for mirror paths, remote identifiers and content
//! fingerprints. Each newtype checks its invariants at construction time so
//! the rest of the workspace can pass them around without re-validating.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::DomainError;

// ============================================================================
// Local paths
// ============================================================================

/// A path relative to the mount root, using `/` as separator
///
/// The empty string is the mount root itself. Segments are never empty and
/// never `.` or `..`, so two equal directories always have equal keys in
/// the state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns error if the path is absolute, has a trailing separator, or
    /// contains empty, `.` or `..` segments
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.is_empty() {
            return Ok(Self(path));
        }

        if path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Relative path must not start with '/': {path}"
            )));
        }

        if path.contains('\0') {
            return Err(DomainError::InvalidPath(
                "Relative path must not contain NUL".to_string(),
            ));
        }

        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "Relative path has an invalid segment: {path}"
                )));
            }
        }

        Ok(Self(path))
    }

    /// The mount root
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Build a relative path from an absolute path located under `root`
    ///
    /// # Errors
    /// Returns error if `path` is not under `root` or is not valid UTF-8
    pub fn from_local(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let stripped = path
            .strip_prefix(root)
            .map_err(|_| DomainError::PathNotInMountRoot(path.display().to_string()))?;

        let mut segments = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(format!(
                            "Path is not valid UTF-8: {}",
                            path.display()
                        ))
                    })?;
                    segments.push(part);
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "Unexpected path component in {}",
                        path.display()
                    )))
                }
            }
        }

        Self::new(segments.join("/"))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the mount root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the path segments, outermost first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments (0 for the root)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, or `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Parent directory, or `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Append one segment
    ///
    /// # Errors
    /// Returns error if `segment` is not a single valid segment
    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        if segment.contains('/') {
            return Err(DomainError::InvalidPath(format!(
                "Segment must not contain '/': {segment}"
            )));
        }
        if self.is_root() {
            Self::new(segment.to_string())
        } else {
            Self::new(format!("{}/{}", self.0, segment))
        }
    }

    /// Every non-root prefix from outermost to innermost
    ///
    /// `a/b/c` yields `a`, `a/b`, `a/b/c`.
    #[must_use]
    pub fn prefixes(&self) -> Vec<Self> {
        let mut out = Vec::with_capacity(self.depth());
        let mut current = String::new();
        for segment in self.segments() {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            out.push(Self(current.clone()));
        }
        out
    }

    /// Returns true if `self` equals `prefix` or lies underneath it
    #[must_use]
    pub fn starts_with(&self, prefix: &RelativePath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Resolve this path against a mount root
    #[must_use]
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// Remote identifiers
// ============================================================================

fn validate_remote_id(kind: &str, id: &str) -> Result<(), DomainError> {
    if id.is_empty() {
        return Err(DomainError::InvalidRemoteId(format!(
            "{kind} cannot be empty"
        )));
    }

    if id
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\'')
    {
        return Err(DomainError::InvalidRemoteId(format!(
            "{kind} contains invalid characters: {id}"
        )));
    }

    Ok(())
}

/// Identifier of a folder in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderId(String);

impl FolderId {
    /// Create a new FolderId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace, `/` or quotes
    pub fn new(id: String) -> Result<Self, DomainError> {
        validate_remote_id("Folder ID", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FolderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FolderId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FolderId> for String {
    fn from(id: FolderId) -> Self {
        id.0
    }
}

/// Identifier of a file in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Create a new FileId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace, `/` or quotes
    pub fn new(id: String) -> Result<Self, DomainError> {
        validate_remote_id("File ID", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FileId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

/// Revision marker returned by a content update
///
/// Opaque to the engine; only logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Content fingerprints
// ============================================================================

/// SHA-256 digest of a file's content, as 64 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex encoding
    pub const HEX_LEN: usize = 64;

    /// Create a Fingerprint from its hex form
    ///
    /// # Errors
    /// Returns error unless the input is exactly 64 lowercase hex digits
    pub fn new(hex: String) -> Result<Self, DomainError> {
        if hex.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidFingerprint(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                hex.len()
            )));
        }

        if !hex
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DomainError::InvalidFingerprint(format!(
                "not lowercase hex: {hex}"
            )));
        }

        Ok(Self(hex))
    }

    /// Fingerprint a buffer
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = FingerprintHasher::new();
        hasher.update(content);
        hasher.finish()
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

/// Incremental [`Fingerprint`] over content read in pieces
#[derive(Debug, Clone, Default)]
pub struct FingerprintHasher {
    digest: Sha256,
    len: u64,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, piece: &[u8]) {
        self.digest.update(piece);
        self.len += piece.len() as u64;
    }

    /// Bytes fed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn finish(self) -> Fingerprint {
        let hex = self
            .digest
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Fingerprint(hex)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}
