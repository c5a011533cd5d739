//! File metadata and directory entries
//!
//! The store-independent view of a path: what kind of object it is,
//! how big it is, its permission bits and when it last changed.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file
    RegularFile,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        }
    }
}

/// Metadata for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Final path component ("" for a store root)
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Last modification time
    pub modified: SystemTime,
    /// Object kind
    pub kind: FileType,
}

impl FileInfo {
    /// Metadata for a regular file
    pub fn file(name: impl Into<String>, size: u64, mode: u32, modified: SystemTime) -> Self {
        FileInfo {
            name: name.into(),
            size,
            mode,
            modified,
            kind: FileType::RegularFile,
        }
    }

    /// Metadata for a directory
    pub fn directory(name: impl Into<String>, mode: u32, modified: SystemTime) -> Self {
        FileInfo {
            name: name.into(),
            size: 0,
            mode,
            modified,
            kind: FileType::Directory,
        }
    }

    #[cfg(unix)]
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileInfo {
            name: name.into(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mode: meta.mode() & 0o7777,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            kind: FileType::from(meta.file_type()),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        let mode = match (meta.is_dir(), meta.permissions().readonly()) {
            (true, _) => 0o755,
            (false, true) => 0o444,
            (false, false) => 0o644,
        };
        FileInfo {
            name: name.into(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mode,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            kind: FileType::from(meta.file_type()),
        }
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }

    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        self.kind == FileType::RegularFile
    }
}

/// One entry of a directory listing
///
/// Entries are identified by name within their parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    info: FileInfo,
}

impl DirEntry {
    pub fn new(info: FileInfo) -> Self {
        DirEntry { info }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    pub fn file_type(&self) -> FileType {
        self.info.kind
    }

    pub fn mode(&self) -> u32 {
        self.info.mode
    }

    /// Full metadata for the entry
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn into_info(self) -> FileInfo {
        self.info
    }
}

impl From<FileInfo> for DirEntry {
    fn from(info: FileInfo) -> Self {
        DirEntry::new(info)
    }
}
