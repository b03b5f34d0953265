//! Path containment and safe write primitives.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Minimum free space required in a target directory before writing
/// subtitle output (100 MB).
pub const MIN_FREE_BYTES: u64 = 100 * 1024 * 1024;

/// Errors raised by containment checks and safe writes.
#[derive(Debug, Error)]
pub enum PathSafetyError {
    #[error("Path {child} escapes {root}")]
    Escape { child: String, root: String },

    #[error("Insufficient disk space in {dir}: {available} bytes available")]
    DiskFull { dir: String, available: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> PathSafetyError {
    PathSafetyError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Resolve symlinks as far as the filesystem allows.
///
/// For paths that do not exist yet, the nearest existing ancestor is
/// canonicalized and the remaining components are re-appended, so a
/// containment check on a to-be-created file still sees through symlinked
/// parents.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = path.canonicalize() {
        return real;
    }
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
    let mut real = existing.canonicalize().unwrap_or(existing);
    for name in tail.into_iter().rev() {
        real.push(name);
    }
    real
}

/// Whether `child` resolves to a path under `root`.
///
/// Both sides are resolved to real paths and compared component-wise, so
/// `..` segments and symlinks cannot escape. `child == root` counts as
/// within.
pub fn is_within(child: &Path, root: &Path) -> bool {
    let child = resolve(child);
    let root = resolve(root);
    child.starts_with(&root)
}

/// Containment check that returns the resolved child on success.
pub fn ensure_within(child: &Path, root: &Path) -> Result<PathBuf, PathSafetyError> {
    let resolved = resolve(child);
    if resolved.starts_with(resolve(root)) {
        Ok(resolved)
    } else {
        Err(PathSafetyError::Escape {
            child: child.display().to_string(),
            root: root.display().to_string(),
        })
    }
}

/// Free bytes available on the disk holding `dir`.
///
/// Picks the mounted disk whose mount point is the longest prefix of the
/// resolved directory. Returns `None` when no disk matches (e.g. in
/// containerized test environments), in which case callers proceed.
pub fn available_space(dir: &Path) -> Option<u64> {
    let resolved = resolve(dir);
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| resolved.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

/// Require at least [`MIN_FREE_BYTES`] free in `dir`.
pub fn check_disk_space(dir: &Path) -> Result<(), PathSafetyError> {
    if let Some(available) = available_space(dir) {
        if available < MIN_FREE_BYTES {
            return Err(PathSafetyError::DiskFull {
                dir: dir.display().to_string(),
                available,
            });
        }
    }
    Ok(())
}

/// Write `bytes` to `path` atomically: write a `.tmp` sibling, fsync, rename.
///
/// Parent directories are created as needed.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), PathSafetyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out")
    ));
    {
        let mut file = fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(bytes).map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(path, e)
    })?;
    Ok(())
}

/// Backup sibling path for in-place tools: `episode.de.srt` -> `episode.de.bak.srt`.
pub fn backup_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_extension(format!("bak.{ext}")),
        None => path.with_extension("bak"),
    }
}

/// Copy `path` to its backup sibling, returning the backup path.
pub fn create_backup(path: &Path) -> Result<PathBuf, PathSafetyError> {
    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|e| io_err(path, e))?;
    Ok(backup)
}

/// Quality metadata sidecar for a subtitle: `episode.de.ass` -> `episode.de.ass.quality.json`.
pub fn quality_sidecar_path(subtitle: &Path) -> PathBuf {
    let mut s = subtitle.as_os_str().to_os_string();
    s.push(".quality.json");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_within_basic() {
        let root = TempDir::new().unwrap();
        let child = root.path().join("a/b/c.srt");
        assert!(is_within(&child, root.path()));
        assert!(is_within(root.path(), root.path()));
    }

    #[test]
    fn test_is_within_rejects_dotdot() {
        let root = TempDir::new().unwrap();
        let child = root.path().join("a/../../etc/passwd");
        assert!(!is_within(&child, root.path()));
    }

    #[test]
    fn test_is_within_rejects_sibling_prefix() {
        let root = TempDir::new().unwrap();
        let sibling = PathBuf::from(format!("{}_evil/file", root.path().display()));
        assert!(!is_within(&sibling, root.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_within_rejects_symlink_escape() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let link = root.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        assert!(!is_within(&link.join("x.srt"), root.path()));
    }

    #[test]
    fn test_ensure_within_error() {
        let root = TempDir::new().unwrap();
        let err = ensure_within(Path::new("/etc/passwd"), root.path()).unwrap_err();
        assert!(matches!(err, PathSafetyError::Escape { .. }));
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("Show/Season 01/ep.de.srt");
        atomic_write(&target, b"1\n00:00:01,000 --> 00:00:02,000\nhi\n").unwrap();
        assert!(target.exists());
        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.contains("hi"));
        // No leftover temp file.
        let entries: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_backup_path_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("/m/ep.de.srt")),
            PathBuf::from("/m/ep.de.bak.srt")
        );
    }

    #[test]
    fn test_create_backup_copies_content() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("ep.de.srt");
        std::fs::write(&file, "payload").unwrap();
        let backup = create_backup(&file).unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "payload");
    }

    #[test]
    fn test_quality_sidecar_path() {
        assert_eq!(
            quality_sidecar_path(Path::new("/m/ep.de.ass")),
            PathBuf::from("/m/ep.de.ass.quality.json")
        );
    }
}
