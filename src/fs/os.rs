//! On-disk backing store
//!
//! Pass-through access to a directory of the host filesystem. Virtual
//! paths are resolved under the store root.

use crate::error::{Error, Result};
use crate::metadata::{DirEntry, FileInfo};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{
    base_name, clean, paginate, File, FileReadDir, FileSeek, FileWrite, Filesystem, FsChmod,
    FsChtimes, FsCreate, FsMkdir, FsRemove, FsRename, FsStat,
};

/// Filesystem rooted at a host directory
#[derive(Debug, Clone)]
pub struct OsFs {
    /// Root path on the host
    root: PathBuf,
    /// Name used in logs
    name: String,
}

impl OsFs {
    /// Create a store rooted at an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(root));
        }
        let name = format!("os:{}", root.display());
        Ok(Self { root, name })
    }

    /// Get the root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to a host path
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(clean(path))
    }

    fn info_at(&self, path: &Path) -> Result<FileInfo> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| Error::from_io(e, path))?;
        Ok(FileInfo::from_metadata(base_name(path), &meta))
    }

    fn read_entries(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();

        for entry in fs::read_dir(&resolved).map_err(|e| Error::from_io(e, path))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            entries.push(DirEntry::new(FileInfo::from_metadata(name, &meta)));
        }

        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }
}

impl Filesystem for OsFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        let resolved = self.resolve(path);
        let meta = fs::metadata(&resolved).map_err(|e| Error::from_io(e, path))?;

        let handle = if meta.is_dir() {
            Handle::Dir {
                entries: self.read_entries(path)?,
                cursor: 0,
            }
        } else {
            Handle::File(fs::File::open(&resolved).map_err(|e| Error::from_io(e, path))?)
        };

        Ok(Box::new(OsFile {
            name: path.to_string_lossy().into_owned(),
            path: resolved,
            handle,
            writable: false,
        }))
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

impl FsStat for OsFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.info_at(path)
    }
}

impl FsCreate for OsFs {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let resolved = self.resolve(path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&resolved)
            .map_err(|e| Error::from_io(e, path))?;

        Ok(Box::new(OsFile {
            name: path.to_string_lossy().into_owned(),
            path: resolved,
            handle: Handle::File(file),
            writable: true,
        }))
    }
}

impl FsMkdir for OsFs {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        dir_builder(mode, false)
            .create(self.resolve(path))
            .map_err(|e| Error::from_io(e, path))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        dir_builder(mode, true)
            .create(self.resolve(path))
            .map_err(|e| Error::from_io(e, path))
    }
}

impl FsRemove for OsFs {
    fn remove(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        let meta = fs::symlink_metadata(&resolved).map_err(|e| Error::from_io(e, path))?;
        if meta.is_dir() {
            fs::remove_dir(&resolved).map_err(|e| Error::from_io(e, path))
        } else {
            fs::remove_file(&resolved).map_err(|e| Error::from_io(e, path))
        }
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        let result = match fs::symlink_metadata(&resolved) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&resolved),
            Ok(_) => fs::remove_file(&resolved),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(|e| Error::from_io(e, path)),
        }
    }
}

impl FsRename for OsFs {
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to)).map_err(|e| Error::from_io(e, from))
    }
}

impl FsChmod for OsFs {
    #[cfg(unix)]
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(self.resolve(path), fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| Error::from_io(e, path))
    }

    #[cfg(not(unix))]
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        let resolved = self.resolve(path);
        let mut perms = fs::metadata(&resolved)
            .map_err(|e| Error::from_io(e, path))?
            .permissions();
        perms.set_readonly(mode & 0o200 == 0);
        fs::set_permissions(&resolved, perms).map_err(|e| Error::from_io(e, path))
    }
}

impl FsChtimes for OsFs {
    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        let resolved = self.resolve(path);
        let is_dir = fs::metadata(&resolved)
            .map_err(|e| Error::from_io(e, path))?
            .is_dir();

        let file = if is_dir {
            fs::File::open(&resolved)
        } else {
            fs::OpenOptions::new().write(true).open(&resolved)
        }
        .map_err(|e| Error::from_io(e, path))?;

        let times = fs::FileTimes::new()
            .set_accessed(accessed)
            .set_modified(modified);
        file.set_times(times).map_err(|e| Error::from_io(e, path))
    }
}

#[cfg(unix)]
fn dir_builder(mode: u32, recursive: bool) -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive).mode(mode & 0o7777);
    builder
}

#[cfg(not(unix))]
fn dir_builder(_mode: u32, recursive: bool) -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive);
    builder
}

enum Handle {
    File(fs::File),
    /// Directory listing is read once at open time
    Dir {
        entries: Vec<DirEntry>,
        cursor: usize,
    },
    Closed,
}

/// Open handle onto a host file or directory
pub struct OsFile {
    name: String,
    path: PathBuf,
    handle: Handle,
    writable: bool,
}

impl File for OsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.handle {
            Handle::File(file) => Ok(file.read(buf)?),
            Handle::Dir { .. } => Err(Error::IsADirectory(PathBuf::from(&self.name))),
            Handle::Closed => Err(Error::BadDescriptor),
        }
    }

    fn stat(&self) -> Result<FileInfo> {
        let name = base_name(Path::new(&self.name));
        match &self.handle {
            Handle::File(file) => Ok(FileInfo::from_metadata(name, &file.metadata()?)),
            Handle::Dir { .. } => {
                let meta = fs::metadata(&self.path)
                    .map_err(|e| Error::from_io(e, PathBuf::from(&self.name)))?;
                Ok(FileInfo::from_metadata(name, &meta))
            }
            Handle::Closed => Err(Error::BadDescriptor),
        }
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Closed => Err(Error::BadDescriptor),
            Handle::File(file) if self.writable => Ok(file.sync_all()?),
            _ => Ok(()),
        }
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
        match self.handle {
            Handle::Dir { .. } => Some(self),
            _ => None,
        }
    }
}

impl FileWrite for OsFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.handle {
            Handle::File(file) => Ok(file.write(buf)?),
            Handle::Dir { .. } => Err(Error::IsADirectory(PathBuf::from(&self.name))),
            Handle::Closed => Err(Error::BadDescriptor),
        }
    }
}

impl FileSeek for OsFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match &mut self.handle {
            Handle::File(file) => Ok(file.seek(pos)?),
            Handle::Dir { .. } => Err(Error::IsADirectory(PathBuf::from(&self.name))),
            Handle::Closed => Err(Error::BadDescriptor),
        }
    }
}

impl FileReadDir for OsFile {
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>> {
        match &mut self.handle {
            Handle::Dir { entries, cursor } => paginate(entries, cursor, n),
            Handle::File(_) => Err(Error::NotADirectory(PathBuf::from(&self.name))),
            Handle::Closed => Err(Error::BadDescriptor),
        }
    }
}
