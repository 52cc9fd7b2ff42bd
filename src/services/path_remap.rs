use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::Result;

/// Judge whether a path is absolute *syntactically*, without asking the host
/// OS. A job may be submitted from Windows and rendered on Linux (or the
/// other way around), so `C:\scene.blend`, `/home/user/scene.blend` and
/// `\\server\share\scene.blend` must all count as absolute everywhere.
pub fn is_absolute_any_os(file_path: &str) -> bool {
    let bytes = file_path.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if bytes[0] == b'/' || bytes[0] == b'\\' {
        return true;
    }
    // drive letter pattern X:/ or X:\; boundary-safe slice so a leading
    // multi-byte character cannot panic the check
    if matches!(file_path.get(1..3), Some(":/") | Some(":\\")) {
        return true;
    }
    Path::new(file_path).is_absolute()
}

// separators unified to '/' so prefix comparison works across OS conventions
fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    match unified.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_owned(),
        _ => unified,
    }
}

/// Resolve where a job file belongs on this machine.
///
/// Relative paths keep their directory structure under `prefix_directory`.
/// Absolute paths are left untouched when they already resolve here (shared
/// mounts) unless `force` is set; otherwise the `prefix_path` prefix of
/// their parent directory is swapped for `prefix_directory`, creating
/// intermediate directories as needed. Anything else is flattened to a bare
/// filename under `prefix_directory`.
///
/// Flattening can collide two same-named files from different source
/// directories; kept as is for compatibility with existing farms.
pub fn remap(
    prefix_directory: &Path,
    file_path: &str,
    prefix_path: &str,
    force: bool,
) -> Result<PathBuf> {
    if !is_absolute_any_os(file_path) {
        return Ok(prefix_directory.join(file_path));
    }

    let full_path = PathBuf::from(file_path);
    if !force && full_path.exists() {
        return Ok(full_path);
    }

    let normalized = normalize(file_path);
    let (parent, name) = match normalized.rsplit_once('/') {
        Some(split) => split,
        None => ("", normalized.as_str()),
    };

    let prefix = normalize(prefix_path);
    if !prefix.is_empty() && parent.starts_with(prefix.as_str()) {
        let remainder = parent[prefix.len()..].trim_start_matches('/');
        if remainder.is_empty() {
            Ok(prefix_directory.join(name))
        } else {
            let directory = prefix_directory.join(remainder);
            fs::create_dir_all(&directory)?;
            Ok(directory.join(name))
        }
    } else {
        Ok(prefix_directory.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absoluteness_is_syntactic_on_every_host() {
        assert!(is_absolute_any_os("C:\\scene.blend"));
        assert!(is_absolute_any_os("C:/textures/wood.png"));
        assert!(is_absolute_any_os("/home/user/scene.blend"));
        assert!(is_absolute_any_os("\\\\server\\share\\scene.blend"));
        assert!(!is_absolute_any_os("textures/wood.png"));
        assert!(!is_absolute_any_os(""));
    }

    #[test]
    fn non_ascii_leading_paths_classify_as_relative() {
        assert!(!is_absolute_any_os("Übersicht/tex.png"));
        assert!(!is_absolute_any_os("素材.png"));
        assert!(is_absolute_any_os("/静止画/scene.blend"));

        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(dir.path(), "Übersicht/tex.png", "", false).unwrap();
        assert_eq!(resolved, dir.path().join("Übersicht/tex.png"));
    }

    #[test]
    fn relative_paths_keep_their_structure() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(dir.path(), "textures/wood.png", "", false).unwrap();
        assert_eq!(resolved, dir.path().join("textures/wood.png"));
    }

    #[test]
    fn existing_absolute_paths_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("scene.blend");
        std::fs::write(&shared, b"scene").unwrap();

        let target = tempfile::tempdir().unwrap();
        let resolved = remap(
            target.path(),
            shared.to_str().unwrap(),
            dir.path().to_str().unwrap(),
            false,
        )
        .unwrap();
        assert_eq!(resolved, shared);

        // force overrides the shared-mount shortcut
        let forced = remap(
            target.path(),
            shared.to_str().unwrap(),
            dir.path().to_str().unwrap(),
            true,
        )
        .unwrap();
        assert_eq!(forced, target.path().join("scene.blend"));
    }

    #[test]
    fn prefix_is_stripped_and_rerooted() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(
            dir.path(),
            "/projects/shot_04/textures/wood.png",
            "/projects",
            false,
        )
        .unwrap();
        assert_eq!(resolved, dir.path().join("shot_04/textures/wood.png"));
        // intermediate directories were materialized
        assert!(dir.path().join("shot_04/textures").is_dir());
    }

    #[test]
    fn windows_source_reroots_under_unix_prefix_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(
            dir.path(),
            "D:\\projects\\shot_04\\scene.blend",
            "D:\\projects",
            false,
        )
        .unwrap();
        assert_eq!(resolved, dir.path().join("shot_04/scene.blend"));
    }

    #[test]
    fn exact_prefix_match_lands_directly_under_prefix_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(dir.path(), "/projects/scene.blend", "/projects", false).unwrap();
        assert_eq!(resolved, dir.path().join("scene.blend"));
    }

    #[test]
    fn unrelated_absolute_paths_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = remap(
            dir.path(),
            "/somewhere/else/wood.png",
            "/projects",
            false,
        )
        .unwrap();
        assert_eq!(resolved, dir.path().join("wood.png"));
    }

    #[test]
    fn remap_is_idempotent_once_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let first = remap(dir.path(), "/projects/shot/wood.png", "/projects", false).unwrap();
        std::fs::write(&first, b"texture").unwrap();
        let second = remap(dir.path(), "/projects/shot/wood.png", "/projects", false).unwrap();
        assert_eq!(first, second);
    }
}
