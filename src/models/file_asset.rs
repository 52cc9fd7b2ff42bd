use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::Result;
use crate::services::hashing;

/// One asset file a job needs to render: the scene file itself or a
/// dependency cache. Identified by its index within the job plus a content
/// hash so the bytes can be verified after every transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAsset {
    /// Canonical path as known to the submitting machine. May be an
    /// absolute path of a foreign OS; never resolved against the local
    /// filesystem without going through the path remapper.
    pub path: PathBuf,
    /// MD5 hex digest over the file bytes.
    pub content_hash: String,
    /// Where the file landed locally after remapping, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remapped_path: Option<PathBuf>,
    /// Master side bookkeeping: the bytes arrived and matched the hash.
    #[serde(default)]
    pub present: bool,
}

impl FileAsset {
    pub fn new(path: impl Into<PathBuf>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            remapped_path: None,
            present: false,
        }
    }

    /// Reference a local file, hashing its current content.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content_hash = hashing::hash_file(path)?;
        Ok(Self::new(path, content_hash))
    }
}
