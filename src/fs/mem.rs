//! In-memory backing store
//!
//! Thread-safe via internal locks. Handles from `open` read a copy of the
//! content taken at open time, so later writes to the path are not seen
//! through them. Handles from `create` write through to the live node.
//! Handle `stat` always reports the live node.

use crate::error::{Error, Result};
use crate::metadata::{DirEntry, FileInfo, FileType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::{
    base_name, clean, paginate, File, FileReadDir, FileSeek, FileWrite, Filesystem, FsChmod,
    FsChtimes, FsCreate, FsMkdir, FsRemove, FsRename, FsStat,
};

/// Default permissions for newly created files
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug)]
struct Node {
    kind: FileType,
    data: Vec<u8>,
    mode: u32,
    modified: SystemTime,
}

impl Node {
    fn file(mode: u32) -> Self {
        Node {
            kind: FileType::RegularFile,
            data: Vec::new(),
            mode,
            modified: SystemTime::now(),
        }
    }

    fn directory(mode: u32) -> Self {
        Node {
            kind: FileType::Directory,
            data: Vec::new(),
            mode,
            modified: SystemTime::now(),
        }
    }

    fn info(&self, name: String) -> FileInfo {
        FileInfo {
            name,
            size: if self.kind == FileType::Directory {
                0
            } else {
                self.data.len() as u64
            },
            mode: self.mode,
            modified: self.modified,
            kind: self.kind,
        }
    }
}

type SharedNode = Arc<RwLock<Node>>;

/// In-memory filesystem
pub struct MemFs {
    name: String,
    nodes: RwLock<HashMap<PathBuf, SharedNode>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create a new empty in-memory filesystem
    pub fn new() -> Self {
        Self::named("mem")
    }

    /// Create an empty filesystem with a name for logs
    pub fn named(name: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        // Root directory always exists
        nodes.insert(
            PathBuf::new(),
            Arc::new(RwLock::new(Node::directory(0o755))),
        );
        Self {
            name: name.into(),
            nodes: RwLock::new(nodes),
        }
    }

    /// Write a whole file, creating missing parent directories
    pub fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = clean(path);
        if let Some(parent) = key.parent() {
            self.mkdir_all(parent, 0o755)?;
        }
        let mut file = self.create(&key)?;
        super::write_all(file.as_mut(), data)?;
        file.close()
    }

    /// Read a whole file
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let node = self.lookup(path)?;
        let node = node.read();
        if node.kind == FileType::Directory {
            return Err(Error::IsADirectory(path.to_path_buf()));
        }
        Ok(node.data.clone())
    }

    /// Check if a path exists
    pub fn exists(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(&clean(path))
    }

    fn lookup(&self, path: &Path) -> Result<SharedNode> {
        self.nodes
            .read()
            .get(&clean(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }

    /// Parent of `key` must exist and be a directory
    fn check_parent(nodes: &HashMap<PathBuf, SharedNode>, key: &Path, path: &Path) -> Result<()> {
        let parent = key.parent().unwrap_or(Path::new(""));
        match nodes.get(parent) {
            Some(node) if node.read().kind == FileType::Directory => Ok(()),
            Some(_) => Err(Error::NotADirectory(parent.to_path_buf())),
            None => Err(Error::NotFound(path.to_path_buf())),
        }
    }

    fn children(nodes: &HashMap<PathBuf, SharedNode>, dir: &Path) -> Vec<DirEntry> {
        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(key, _)| !key.as_os_str().is_empty() && key.parent() == Some(dir))
            .map(|(key, node)| DirEntry::new(node.read().info(base_name(key))))
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    fn handle(&self, path: &Path, node: SharedNode, writable: bool) -> MemFile {
        let is_dir = node.read().kind == FileType::Directory;
        let listing = if is_dir {
            Some(Self::children(&self.nodes.read(), &clean(path)))
        } else {
            None
        };
        let snapshot = if is_dir || writable {
            None
        } else {
            Some(node.read().data.clone())
        };
        MemFile {
            name: path.to_string_lossy().into_owned(),
            node: Some(node),
            snapshot,
            cursor: 0,
            writable,
            listing,
            dir_cursor: 0,
        }
    }
}

impl Filesystem for MemFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        let node = self.lookup(path)?;
        Ok(Box::new(self.handle(path, node, false)))
    }

    fn as_stat(&self) -> Option<&dyn FsStat> {
        Some(self)
    }

    fn as_create(&self) -> Option<&dyn FsCreate> {
        Some(self)
    }

    fn as_mkdir(&self) -> Option<&dyn FsMkdir> {
        Some(self)
    }

    fn as_remove(&self) -> Option<&dyn FsRemove> {
        Some(self)
    }

    fn as_rename(&self) -> Option<&dyn FsRename> {
        Some(self)
    }

    fn as_chmod(&self) -> Option<&dyn FsChmod> {
        Some(self)
    }

    fn as_chtimes(&self) -> Option<&dyn FsChtimes> {
        Some(self)
    }
}

impl FsStat for MemFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let node = self.lookup(path)?;
        let info = node.read().info(base_name(path));
        Ok(info)
    }
}

impl FsCreate for MemFs {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let key = clean(path);
        let node = {
            let mut nodes = self.nodes.write();
            Self::check_parent(&nodes, &key, path)?;

            match nodes.get(&key) {
                Some(existing) => {
                    let mut guard = existing.write();
                    if guard.kind == FileType::Directory {
                        return Err(Error::IsADirectory(path.to_path_buf()));
                    }
                    guard.data.clear();
                    guard.modified = SystemTime::now();
                    drop(guard);
                    existing.clone()
                }
                None => {
                    let node = Arc::new(RwLock::new(Node::file(DEFAULT_FILE_MODE)));
                    nodes.insert(key, node.clone());
                    node
                }
            }
        };
        Ok(Box::new(self.handle(path, node, true)))
    }
}

impl FsMkdir for MemFs {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let key = clean(path);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&key) {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        Self::check_parent(&nodes, &key, path)?;
        nodes.insert(key, Arc::new(RwLock::new(Node::directory(mode))));
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let key = clean(path);
        let mut nodes = self.nodes.write();

        let mut current = PathBuf::new();
        for component in key.components() {
            current.push(component);
            match nodes.get(&current) {
                Some(node) if node.read().kind == FileType::Directory => {}
                Some(_) => return Err(Error::NotADirectory(current)),
                None => {
                    nodes.insert(current.clone(), Arc::new(RwLock::new(Node::directory(mode))));
                }
            }
        }
        Ok(())
    }
}

impl FsRemove for MemFs {
    fn remove(&self, path: &Path) -> Result<()> {
        let key = clean(path);
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&key) {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        if nodes.keys().any(|k| k != &key && k.starts_with(&key)) {
            return Err(Error::DirectoryNotEmpty(path.to_path_buf()));
        }
        nodes.remove(&key);
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let key = clean(path);
        let mut nodes = self.nodes.write();
        if key.as_os_str().is_empty() {
            // Keep the root itself
            nodes.retain(|k, _| k.as_os_str().is_empty());
        } else {
            nodes.retain(|k, _| !k.starts_with(&key));
        }
        Ok(())
    }
}

impl FsRename for MemFs {
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_key = clean(from);
        let to_key = clean(to);
        let mut nodes = self.nodes.write();

        if !nodes.contains_key(&from_key) {
            return Err(Error::NotFound(from.to_path_buf()));
        }
        Self::check_parent(&nodes, &to_key, to)?;

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|k| k.starts_with(&from_key))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(&from_key).unwrap_or(Path::new(""));
                nodes.insert(to_key.join(suffix), node);
            }
        }
        Ok(())
    }
}

impl FsChmod for MemFs {
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.lookup(path)?.write().mode = mode & 0o7777;
        Ok(())
    }
}

impl FsChtimes for MemFs {
    fn chtimes(&self, path: &Path, _accessed: SystemTime, modified: SystemTime) -> Result<()> {
        self.lookup(path)?.write().modified = modified;
        Ok(())
    }
}

/// Open handle onto an in-memory node
pub struct MemFile {
    name: String,
    /// `None` once closed
    node: Option<SharedNode>,
    /// Content as of open, for read-only handles
    snapshot: Option<Vec<u8>>,
    cursor: u64,
    writable: bool,
    /// Directory listing captured at open time
    listing: Option<Vec<DirEntry>>,
    dir_cursor: usize,
}

impl MemFile {
    fn node(&self) -> Result<&SharedNode> {
        self.node.as_ref().ok_or(Error::BadDescriptor)
    }
}

impl File for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let node = self.node()?.read();
        if node.kind == FileType::Directory {
            return Err(Error::IsADirectory(PathBuf::from(&self.name)));
        }

        let data = self.snapshot.as_deref().unwrap_or(&node.data);
        let start = (self.cursor as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(node);

        self.cursor += n as u64;
        Ok(n)
    }

    fn stat(&self) -> Result<FileInfo> {
        Ok(self.node()?.read().info(base_name(Path::new(&self.name))))
    }

    fn close(&mut self) -> Result<()> {
        self.node.take().map(|_| ()).ok_or(Error::BadDescriptor)
    }

    fn as_writer(&mut self) -> Option<&mut dyn FileWrite> {
        if self.writable {
            Some(self)
        } else {
            None
        }
    }

    fn as_seeker(&mut self) -> Option<&mut dyn FileSeek> {
        Some(self)
    }

    fn as_dir(&mut self) -> Option<&mut dyn FileReadDir> {
        if self.listing.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl FileWrite for MemFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut node = self.node()?.write();
        if node.kind == FileType::Directory {
            return Err(Error::IsADirectory(PathBuf::from(&self.name)));
        }

        let start = self.cursor as usize;
        let end = start + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        node.modified = SystemTime::now();
        drop(node);

        self.cursor = end as u64;
        Ok(buf.len())
    }
}

impl FileSeek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = match &self.snapshot {
            Some(data) => {
                self.node()?;
                data.len() as i64
            }
            None => self.node()?.read().data.len() as i64,
        };
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.cursor as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            )));
        }
        self.cursor = target as u64;
        Ok(self.cursor)
    }
}

impl FileReadDir for MemFile {
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>> {
        self.node()?;
        match &self.listing {
            Some(entries) => paginate(entries, &mut self.dir_cursor, n),
            None => Err(Error::NotADirectory(PathBuf::from(&self.name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{self as vfs, read_to_end};
    use std::time::Duration;

    #[test]
    fn test_write_and_read_file() {
        let store = MemFs::new();
        store.write_file(Path::new("/a/b/c.txt"), b"hello").unwrap();

        assert!(store.exists(Path::new("a/b")));
        assert_eq!(store.read_file(Path::new("a/b/c.txt")).unwrap(), b"hello");

        let mut file = store.open(Path::new("/a/b/c.txt")).unwrap();
        assert_eq!(read_to_end(file.as_mut()).unwrap(), b"hello");
        assert!(file.as_writer().is_none());
        assert_eq!(file.stat().unwrap().size, 5);
    }

    #[test]
    fn test_open_handle_reads_content_as_of_open() {
        let store = MemFs::new();
        store.write_file(Path::new("f"), b"original").unwrap();

        let mut reader = store.open(Path::new("f")).unwrap();
        store.write_file(Path::new("f"), b"NEW").unwrap();

        assert_eq!(read_to_end(reader.as_mut()).unwrap(), b"original");
        assert_eq!(vfs::seek(reader.as_mut(), SeekFrom::End(0)).unwrap(), 8);
        // Metadata is live
        assert_eq!(reader.stat().unwrap().size, 3);
        reader.close().unwrap();

        let mut fresh = store.open(Path::new("f")).unwrap();
        assert_eq!(read_to_end(fresh.as_mut()).unwrap(), b"NEW");
    }

    #[test]
    fn test_create_requires_parent() {
        let store = MemFs::new();
        let err = vfs::create(&store, Path::new("missing/file")).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_seek_and_overwrite() {
        let store = MemFs::new();
        let mut file = vfs::create(&store, Path::new("f")).unwrap();
        vfs::write_all(file.as_mut(), b"abcdef").unwrap();
        vfs::seek(file.as_mut(), SeekFrom::Start(2)).unwrap();
        vfs::write_all(file.as_mut(), b"XY").unwrap();
        file.close().unwrap();

        assert_eq!(store.read_file(Path::new("f")).unwrap(), b"abXYef");
    }

    #[test]
    fn test_listing_sorted_and_paginated() {
        let store = MemFs::new();
        store.write_file(Path::new("d/b"), b"").unwrap();
        store.write_file(Path::new("d/a"), b"").unwrap();
        store.mkdir_all(Path::new("d/c/deep"), 0o755).unwrap();

        let mut dir = store.open(Path::new("d")).unwrap();
        let page = vfs::read_dir(dir.as_mut(), 2).unwrap();
        assert_eq!(page.iter().map(|e| e.name()).collect::<Vec<_>>(), ["a", "b"]);
        let page = vfs::read_dir(dir.as_mut(), 2).unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].is_dir());
        assert!(vfs::read_dir(dir.as_mut(), 2).unwrap_err().is_end_of_listing());
    }

    #[test]
    fn test_remove_semantics() {
        let store = MemFs::new();
        store.write_file(Path::new("d/x"), b"1").unwrap();

        assert!(matches!(
            vfs::remove(&store, Path::new("d")),
            Err(Error::DirectoryNotEmpty(_))
        ));
        vfs::remove(&store, Path::new("d/x")).unwrap();
        vfs::remove(&store, Path::new("d")).unwrap();
        assert!(vfs::remove(&store, Path::new("d")).unwrap_err().is_not_found());

        store.write_file(Path::new("t/1/2"), b"").unwrap();
        vfs::remove_all(&store, Path::new("t")).unwrap();
        assert!(!store.exists(Path::new("t/1")));
        vfs::remove_all(&store, Path::new("t")).unwrap();
    }

    #[test]
    fn test_open_handle_survives_remove() {
        let store = MemFs::new();
        store.write_file(Path::new("f"), b"kept").unwrap();

        let mut file = store.open(Path::new("f")).unwrap();
        vfs::remove(&store, Path::new("f")).unwrap();
        assert_eq!(read_to_end(file.as_mut()).unwrap(), b"kept");
    }

    #[test]
    fn test_rename_subtree() {
        let store = MemFs::new();
        store.write_file(Path::new("src/a/file"), b"1").unwrap();

        vfs::rename(&store, Path::new("src"), Path::new("dst")).unwrap();
        assert!(!store.exists(Path::new("src/a/file")));
        assert_eq!(store.read_file(Path::new("dst/a/file")).unwrap(), b"1");
    }

    #[test]
    fn test_chtimes_and_chmod() {
        let store = MemFs::new();
        store.write_file(Path::new("f"), b"").unwrap();

        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        vfs::chtimes(&store, Path::new("f"), stamp, stamp).unwrap();
        vfs::chmod(&store, Path::new("f"), 0o600).unwrap();

        let info = vfs::stat(&store, Path::new("/f")).unwrap();
        assert_eq!(info.modified, stamp);
        assert_eq!(info.mode, 0o600);
        assert!(vfs::chtimes(&store, Path::new("g"), stamp, stamp)
            .unwrap_err()
            .is_not_found());
    }
}
