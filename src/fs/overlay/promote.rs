//! Promotion: copy a file from the base store into the overlay store
//!
//! On success the overlay holds the same bytes and modification time as the
//! base. On failure the overlay holds no entry for the path, and parent
//! directories created on the way are removed again, so promotion can be
//! retried.

use crate::error::{Error, Result};
use crate::fs::{self as vfs, File, Filesystem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Copy buffer size
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Mode used for directories created on the way to a promoted file
const PARENT_DIR_MODE: u32 = 0o777;

/// Copy `path` from `base` into `overlay`
pub fn promote(base: &dyn Filesystem, overlay: &dyn Filesystem, path: &Path) -> Result<()> {
    debug!("promote {} from {} into {}", path.display(), base.name(), overlay.name());

    // Open errors are returned as-is so callers can tell not-exist apart
    let mut src = base.open(path)?;

    let created = match create_parents(overlay, path) {
        Ok(created) => created,
        Err(e) => return Err(close_source(src.as_mut(), e)),
    };
    if let Err(e) = copy_into(src.as_mut(), overlay, path, &created) {
        return Err(close_source(src.as_mut(), e));
    }

    if let Err(e) = src.close() {
        return Err(rollback(overlay, path, &created, e));
    }

    debug!("promoted {}", path.display());
    Ok(())
}

/// Create the parent directory of `path` in `fs` when it is missing
pub fn ensure_parent(fs: &dyn Filesystem, path: &Path) -> Result<()> {
    create_parents(fs, path).map(|_| ())
}

/// Create the missing ancestors of `path`, returning them shallowest first
fn create_parents(fs: &dyn Filesystem, path: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() || dir.parent().is_none() {
            break;
        }
        match vfs::stat(fs, dir) {
            Ok(_) => break,
            Err(e) if e.is_not_found() => missing.push(dir.to_path_buf()),
            Err(e) => return Err(e),
        }
        current = dir.parent();
    }
    missing.reverse();

    if let Some(deepest) = missing.last() {
        if let Err(e) = vfs::mkdir_all(fs, deepest, PARENT_DIR_MODE) {
            return Err(remove_dirs(fs, &missing, e));
        }
    }
    Ok(missing)
}

fn copy_into(
    src: &mut dyn File,
    overlay: &dyn Filesystem,
    path: &Path,
    created: &[PathBuf],
) -> Result<()> {
    let mut dst = match vfs::create(overlay, path) {
        Ok(dst) => dst,
        Err(e) => return Err(remove_dirs(overlay, created, e)),
    };
    if dst.as_writer().is_none() {
        let err = Error::unsupported("write", path);
        return Err(abort(dst.as_mut(), overlay, path, created, err));
    }

    let copied = match copy_bytes(src, dst.as_mut()) {
        Ok(n) => n,
        Err(e) => return Err(abort(dst.as_mut(), overlay, path, created, e)),
    };

    let info = match src.stat() {
        Ok(info) => info,
        Err(e) => return Err(abort(dst.as_mut(), overlay, path, created, e)),
    };
    if copied != info.size {
        let err = Error::Integrity {
            path: path.to_path_buf(),
            copied,
            expected: info.size,
        };
        return Err(abort(dst.as_mut(), overlay, path, created, err));
    }

    if let Err(e) = dst.close() {
        return Err(rollback(overlay, path, created, e));
    }

    // Stamp the copy with the source time so it never looks newer than it is
    if let Err(e) = vfs::chtimes(overlay, path, info.modified, info.modified) {
        return Err(rollback(overlay, path, created, e));
    }

    Ok(())
}

fn copy_bytes(src: &mut dyn File, dst: &mut dyn File) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(copied);
        }
        vfs::write_all(dst, &buf[..n])?;
        copied += n as u64;
    }
}

/// Close the source handle after a failed copy, keeping both causes
fn close_source(src: &mut dyn File, err: Error) -> Error {
    match src.close() {
        Ok(()) => err,
        Err(close_err) => Error::join(err, close_err),
    }
}

/// Close the half-written overlay handle, then roll back
fn abort(
    dst: &mut dyn File,
    overlay: &dyn Filesystem,
    path: &Path,
    created: &[PathBuf],
    err: Error,
) -> Error {
    let err = match dst.close() {
        Ok(()) => err,
        Err(close_err) => Error::join(err, close_err),
    };
    rollback(overlay, path, created, err)
}

/// Remove the overlay entry for `path` and the directories created for it,
/// keeping every failure cause
fn rollback(overlay: &dyn Filesystem, path: &Path, created: &[PathBuf], err: Error) -> Error {
    warn!("promotion of {} failed, removing overlay copy: {}", path.display(), err);
    let err = match vfs::remove(overlay, path) {
        Ok(()) => err,
        Err(e) if e.is_not_found() => err,
        Err(e) => Error::join(err, e),
    };
    remove_dirs(overlay, created, err)
}

/// Remove `dirs` deepest first
fn remove_dirs(fs: &dyn Filesystem, dirs: &[PathBuf], err: Error) -> Error {
    let mut err = err;
    for dir in dirs.iter().rev() {
        match vfs::remove(fs, dir) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                err = Error::join(err, e);
                break;
            }
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::{FaultyFs, Faults};
    use crate::fs::MemFs;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn base_with(path: &str, content: &[u8]) -> Arc<MemFs> {
        let base = MemFs::named("base");
        base.write_file(Path::new(path), content).unwrap();
        Arc::new(base)
    }

    #[test]
    fn test_promote_copies_bytes_and_mtime() {
        let base = base_with("dir/sub/file.txt", b"promoted content");
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_234_567);
        vfs::chtimes(base.as_ref(), Path::new("dir/sub/file.txt"), stamp, stamp).unwrap();
        let overlay = MemFs::named("overlay");

        promote(base.as_ref(), &overlay, Path::new("dir/sub/file.txt")).unwrap();

        assert_eq!(
            overlay.read_file(Path::new("dir/sub/file.txt")).unwrap(),
            b"promoted content"
        );
        let info = vfs::stat(&overlay, Path::new("dir/sub/file.txt")).unwrap();
        assert_eq!(info.modified, stamp);
        assert!(vfs::stat(&overlay, Path::new("dir/sub")).unwrap().is_dir());
    }

    #[test]
    fn test_promote_large_file() {
        let content: Vec<u8> = (0..(3 * COPY_BUFFER_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        let base = base_with("big.bin", &content);
        let overlay = MemFs::new();

        promote(base.as_ref(), &overlay, Path::new("big.bin")).unwrap();
        assert_eq!(overlay.read_file(Path::new("big.bin")).unwrap(), content);
    }

    #[test]
    fn test_missing_source_error_is_verbatim() {
        let base = MemFs::new();
        let overlay = MemFs::new();

        let err = promote(&base, &overlay, Path::new("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!overlay.exists(Path::new("nope")));
    }

    fn assert_rolled_back(faults: Faults, check: impl Fn(&Error) -> bool) {
        let base = base_with("a/file", b"payload");
        let overlay_store = Arc::new(MemFs::named("overlay"));
        let overlay = FaultyFs::new(overlay_store.clone(), faults);

        let err = promote(base.as_ref(), &overlay, Path::new("a/file")).unwrap_err();
        assert!(check(&err), "unexpected error: {}", err);
        assert!(!overlay_store.exists(Path::new("a/file")));
        // The parent was created by the failed attempt
        assert!(!overlay_store.exists(Path::new("a")));

        // Retry succeeds once the fault is gone
        promote(base.as_ref(), overlay_store.as_ref(), Path::new("a/file")).unwrap();
        assert_eq!(overlay_store.read_file(Path::new("a/file")).unwrap(), b"payload");
    }

    #[test]
    fn test_copy_failure_rolls_back() {
        assert_rolled_back(
            Faults {
                write: true,
                ..Default::default()
            },
            |e| e.to_string().contains("injected write"),
        );
    }

    #[test]
    fn test_close_failure_rolls_back() {
        assert_rolled_back(
            Faults {
                close: true,
                ..Default::default()
            },
            |e| e.to_string().contains("injected close"),
        );
    }

    #[test]
    fn test_chtimes_failure_rolls_back() {
        assert_rolled_back(
            Faults {
                chtimes: true,
                ..Default::default()
            },
            |e| e.to_string().contains("injected chtimes"),
        );
    }

    #[test]
    fn test_unwritable_handle_rolls_back() {
        assert_rolled_back(
            Faults {
                no_writer: true,
                ..Default::default()
            },
            |e| e.is_unsupported(),
        );
    }

    #[test]
    fn test_rollback_keeps_existing_parents() {
        let base = base_with("a/b/c/file", b"payload");
        let overlay_store = Arc::new(MemFs::named("overlay"));
        overlay_store.write_file(Path::new("a/keep"), b"kept").unwrap();
        let overlay = FaultyFs::new(
            overlay_store.clone(),
            Faults {
                write: true,
                ..Default::default()
            },
        );

        promote(base.as_ref(), &overlay, Path::new("a/b/c/file")).unwrap_err();
        assert!(!overlay_store.exists(Path::new("a/b")));
        assert_eq!(overlay_store.read_file(Path::new("a/keep")).unwrap(), b"kept");
    }

    #[test]
    fn test_size_mismatch_is_integrity_error() {
        let base_store = base_with("f", b"12345");
        let base = FaultyFs::new(
            base_store,
            Faults {
                size_skew: true,
                ..Default::default()
            },
        );
        let overlay = MemFs::new();

        let err = promote(&base, &overlay, Path::new("f")).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity {
                copied: 5,
                expected: 6,
                ..
            }
        ));
        assert!(!overlay.exists(Path::new("f")));
    }

    #[test]
    fn test_existing_overlay_entry_is_replaced() {
        let base = base_with("f", b"new");
        let overlay = MemFs::new();
        overlay.write_file(Path::new("f"), b"old and longer").unwrap();

        promote(base.as_ref(), &overlay, Path::new("f")).unwrap();
        assert_eq!(overlay.read_file(Path::new("f")).unwrap(), b"new");
    }
}
