use md5::{Digest, Md5};
use std::fs;
use std::path::Path;

use crate::models::error::Result;

/// Compute the MD5 hex digest of a byte buffer. Deterministic and platform
/// independent; used both for asset identity on transfer and for naming
/// deduplicated cache data.
pub fn hash_bytes(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    format!("{digest:x}")
}

/// Hash a file's content. Reads the whole file into memory - farm assets
/// are scene files and caches, not streams.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let data = fs::read(path)?;
    Ok(hash_bytes(&data))
}

/// Name for a point-cache blob. Falls back to the hex encoded owner name
/// when the cache itself is unnamed, so identical caches under different
/// owners stay distinguishable.
pub fn cache_name(name: &str, owner: &str) -> String {
    if name.is_empty() {
        owner.bytes().map(|b| format!("{b:02X}")).collect()
    } else {
        name.to_owned()
    }
}

/// Sibling cache directory for a scene file, `blendcache_<stem>` next to
/// the file itself.
pub fn cache_path(scene_path: impl AsRef<Path>) -> std::path::PathBuf {
    let scene_path = scene_path.as_ref();
    let stem = scene_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match scene_path.parent() {
        Some(parent) => parent.join(format!("blendcache_{stem}")),
        None => std::path::PathBuf::from(format!("blendcache_{stem}")),
    }
}
