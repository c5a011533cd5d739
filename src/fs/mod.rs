//! Filesystem capability contracts
//!
//! A backing store only has to open paths, and a file handle only has to
//! read, stat and close. Everything else (stat-by-path, create, mkdir,
//! remove, rename, chmod, chtimes, write, seek, directory listing) is an
//! optional capability discovered at call time through the `as_*`
//! accessors. The free functions in this module probe the capability and
//! report `Error::Unsupported` when it is missing, so absence is never
//! confused with a failed call.

mod filter;
mod mem;
mod os;
pub mod overlay;

#[cfg(test)]
pub(crate) mod testing;

pub use filter::{FilterFile, FilterFs};
pub use mem::{MemFile, MemFs};
pub use os::{OsFile, OsFs};

use crate::error::{Error, Result};
use crate::metadata::{DirEntry, FileInfo};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Per-open handle onto a file or directory
pub trait File: Send {
    /// Name the handle was opened with
    fn name(&self) -> &str;

    /// Read into `buf`, advancing the cursor. `Ok(0)` means end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn stat(&self) -> Result<FileInfo>;

    /// Release the handle. Further calls fail with `Error::BadDescriptor`.
    fn close(&mut self) -> Result<()>;

    fn as_writer(&mut self) -> Option<&mut dyn FileWrite> {
        None
    }

    fn as_seeker(&mut self) -> Option<&mut dyn FileSeek> {
        None
    }

    fn as_dir(&mut self) -> Option<&mut dyn FileReadDir> {
        None
    }
}

pub trait FileWrite {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

pub trait FileSeek {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
}

pub trait FileReadDir {
    /// Paginated listing.
    ///
    /// `n <= 0` returns every remaining entry (possibly none). `n > 0`
    /// returns at most `n` entries and `Error::EndOfListing` once nothing
    /// is left.
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>>;
}

/// A hierarchical namespace of paths
pub trait Filesystem: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn File>>;

    fn as_stat(&self) -> Option<&dyn FsStat> {
        None
    }

    fn as_create(&self) -> Option<&dyn FsCreate> {
        None
    }

    fn as_mkdir(&self) -> Option<&dyn FsMkdir> {
        None
    }

    fn as_remove(&self) -> Option<&dyn FsRemove> {
        None
    }

    fn as_rename(&self) -> Option<&dyn FsRename> {
        None
    }

    fn as_chmod(&self) -> Option<&dyn FsChmod> {
        None
    }

    fn as_chtimes(&self) -> Option<&dyn FsChtimes> {
        None
    }
}

pub trait FsStat {
    fn stat(&self, path: &Path) -> Result<FileInfo>;
}

pub trait FsCreate {
    /// Create or truncate a regular file, opened for reading and writing
    fn create(&self, path: &Path) -> Result<Box<dyn File>>;
}

pub trait FsMkdir {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Create `path` and every missing ancestor
    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()>;
}

pub trait FsRemove {
    /// Remove a file or an empty directory
    fn remove(&self, path: &Path) -> Result<()>;

    /// Remove a subtree. A missing path is not an error.
    fn remove_all(&self, path: &Path) -> Result<()>;
}

pub trait FsRename {
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

pub trait FsChmod {
    fn chmod(&self, path: &Path, mode: u32) -> Result<()>;
}

pub trait FsChtimes {
    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()>;
}

/// Stat by path, falling back to open + stat + close when the store has
/// no stat capability
pub fn stat(fs: &dyn Filesystem, path: &Path) -> Result<FileInfo> {
    if let Some(stat) = fs.as_stat() {
        return stat.stat(path);
    }

    let mut file = fs.open(path)?;
    let info = file.stat();
    let closed = file.close();
    match (info, closed) {
        (Ok(info), Ok(())) => Ok(info),
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(close_err)) => Err(Error::join(e, close_err)),
    }
}

pub fn create(fs: &dyn Filesystem, path: &Path) -> Result<Box<dyn File>> {
    match fs.as_create() {
        Some(c) => c.create(path),
        None => Err(Error::unsupported("create", path)),
    }
}

pub fn mkdir(fs: &dyn Filesystem, path: &Path, mode: u32) -> Result<()> {
    match fs.as_mkdir() {
        Some(m) => m.mkdir(path, mode),
        None => Err(Error::unsupported("mkdir", path)),
    }
}

pub fn mkdir_all(fs: &dyn Filesystem, path: &Path, mode: u32) -> Result<()> {
    match fs.as_mkdir() {
        Some(m) => m.mkdir_all(path, mode),
        None => Err(Error::unsupported("mkdir", path)),
    }
}

pub fn remove(fs: &dyn Filesystem, path: &Path) -> Result<()> {
    match fs.as_remove() {
        Some(r) => r.remove(path),
        None => Err(Error::unsupported("remove", path)),
    }
}

pub fn remove_all(fs: &dyn Filesystem, path: &Path) -> Result<()> {
    match fs.as_remove() {
        Some(r) => r.remove_all(path),
        None => Err(Error::unsupported("remove", path)),
    }
}

pub fn rename(fs: &dyn Filesystem, from: &Path, to: &Path) -> Result<()> {
    match fs.as_rename() {
        Some(r) => r.rename(from, to),
        None => Err(Error::unsupported("rename", from)),
    }
}

pub fn chmod(fs: &dyn Filesystem, path: &Path, mode: u32) -> Result<()> {
    match fs.as_chmod() {
        Some(c) => c.chmod(path, mode),
        None => Err(Error::unsupported("chmod", path)),
    }
}

pub fn chtimes(
    fs: &dyn Filesystem,
    path: &Path,
    accessed: SystemTime,
    modified: SystemTime,
) -> Result<()> {
    match fs.as_chtimes() {
        Some(c) => c.chtimes(path, accessed, modified),
        None => Err(Error::unsupported("chtimes", path)),
    }
}

pub fn write(file: &mut dyn File, buf: &[u8]) -> Result<usize> {
    match file.as_writer() {
        Some(w) => w.write(buf),
        None => Err(Error::unsupported("write", file.name())),
    }
}

/// Write the whole buffer, looping over short writes
pub fn write_all(file: &mut dyn File, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match write(file, buf)? {
            0 => {
                return Err(Error::Io(std::io::Error::from(
                    std::io::ErrorKind::WriteZero,
                )))
            }
            n => buf = &buf[n..],
        }
    }
    Ok(())
}

pub fn seek(file: &mut dyn File, pos: SeekFrom) -> Result<u64> {
    match file.as_seeker() {
        Some(s) => s.seek(pos),
        None => Err(Error::unsupported("seek", file.name())),
    }
}

pub fn read_dir(file: &mut dyn File, n: i64) -> Result<Vec<DirEntry>> {
    match file.as_dir() {
        Some(d) => d.read_dir(n),
        None => Err(Error::unsupported("readdir", file.name())),
    }
}

/// Read a file to the end
pub fn read_to_end(file: &mut dyn File) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match file.read(&mut buf)? {
            0 => return Ok(content),
            n => content.extend_from_slice(&buf[..n]),
        }
    }
}

/// Serve one page of an already computed listing, advancing `cursor`
pub fn paginate(entries: &[DirEntry], cursor: &mut usize, n: i64) -> Result<Vec<DirEntry>> {
    let start = (*cursor).min(entries.len());
    let remaining = &entries[start..];

    if n <= 0 {
        *cursor = entries.len();
        return Ok(remaining.to_vec());
    }

    if remaining.is_empty() {
        return Err(Error::EndOfListing);
    }

    let take = remaining.len().min(n as usize);
    *cursor = start + take;
    Ok(remaining[..take].to_vec())
}

/// Normalize a virtual path: drop the root and `.`, resolve `..`.
///
/// The store root normalizes to the empty path.
pub fn clean(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => result.push(s),
            Component::ParentDir => {
                result.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    result
}

/// Final component of a virtual path, "" for the root
pub fn base_name(path: &Path) -> String {
    clean(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
