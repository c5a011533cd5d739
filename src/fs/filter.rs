//! Filtering decorator
//!
//! Wraps any [`Filesystem`] and gates access by a path predicate, optionally
//! refusing every mutation. Files that fail the predicate look absent;
//! directories always pass so the tree can still be walked.

use crate::error::{Error, Result};
use crate::metadata::{DirEntry, FileInfo};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use super::{
    paginate, File, FileReadDir, FileSeek, FileWrite, Filesystem, FsChmod, FsChtimes, FsCreate,
    FsMkdir, FsRemove, FsRename, FsStat,
};

type Predicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Predicate-gated view over another filesystem
pub struct FilterFs {
    inner: Arc<dyn Filesystem>,
    predicate: Predicate,
    read_only: bool,
    name: String,
}

impl FilterFs {
    /// Gate files by an arbitrary predicate on their virtual path
    pub fn new<F>(inner: Arc<dyn Filesystem>, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        let name = format!("filter:{}", inner.name());
        Self {
            inner,
            predicate: Arc::new(predicate),
            read_only: false,
            name,
        }
    }

    /// Only expose files whose name matches `pattern`
    pub fn with_pattern(inner: Arc<dyn Filesystem>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        Ok(Self::new(inner, move |path: &Path| {
            path.file_name()
                .map(|n| regex.is_match(&n.to_string_lossy()))
                .unwrap_or(true)
        }))
    }

    /// Expose everything, refuse every mutation
    pub fn read_only(inner: Arc<dyn Filesystem>) -> Self {
        Self::new(inner, |_: &Path| true).into_read_only()
    }

    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn allows(&self, path: &Path) -> bool {
        (self.predicate)(path)
    }

    /// Check a file path against the predicate. Directories always pass.
    fn check_path(&self, path: &Path) -> Result<()> {
        if self.allows(path) {
            return Ok(());
        }
        match super::stat(self.inner.as_ref(), path) {
            Ok(info) if info.is_dir() => Ok(()),
            _ => Err(Error::NotFound(path.to_path_buf())),
        }
    }

    fn check_write(&self, path: &Path) -> Result<()> {
        if self.read_only {
            return Err(Error::PermissionDenied(path.to_path_buf()));
        }
        self.check_path(path)
    }
}

impl Filesystem for FilterFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        self.check_path(path)?;
        let inner = self.inner.open(path)?;
        Ok(Box::new(FilterFile {
            inner,
            dir: path.to_path_buf(),
            predicate: self.predicate.clone(),
            read_only: self.read_only,
            listing: None,
            cursor: 0,
        }))
    }

    fn as_stat(&self) -> Option<&dyn FsStat> {
        Some(self)
    }

    fn as_create(&self) -> Option<&dyn FsCreate> {
        self.inner.as_create().map(|_| self as &dyn FsCreate)
    }

    fn as_mkdir(&self) -> Option<&dyn FsMkdir> {
        self.inner.as_mkdir().map(|_| self as &dyn FsMkdir)
    }

    fn as_remove(&self) -> Option<&dyn FsRemove> {
        self.inner.as_remove().map(|_| self as &dyn FsRemove)
    }

    fn as_rename(&self) -> Option<&dyn FsRename> {
        self.inner.as_rename().map(|_| self as &dyn FsRename)
    }

    fn as_chmod(&self) -> Option<&dyn FsChmod> {
        self.inner.as_chmod().map(|_| self as &dyn FsChmod)
    }

    fn as_chtimes(&self) -> Option<&dyn FsChtimes> {
        self.inner.as_chtimes().map(|_| self as &dyn FsChtimes)
    }
}

impl FsStat for FilterFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        let info = super::stat(self.inner.as_ref(), path)?;
        if info.is_dir() || self.allows(path) {
            Ok(info)
        } else {
            Err(Error::NotFound(path.to_path_buf()))
        }
    }
}

impl FsCreate for FilterFs {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        if self.read_only {
            return Err(Error::PermissionDenied(path.to_path_buf()));
        }
        if !self.allows(path) {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        super::create(self.inner.as_ref(), path)
    }
}

impl FsMkdir for FilterFs {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        if self.read_only {
            return Err(Error::PermissionDenied(path.to_path_buf()));
        }
        super::mkdir(self.inner.as_ref(), path, mode)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        if self.read_only {
            return Err(Error::PermissionDenied(path.to_path_buf()));
        }
        super::mkdir_all(self.inner.as_ref(), path, mode)
    }
}

impl FsRemove for FilterFs {
    fn remove(&self, path: &Path) -> Result<()> {
        self.check_write(path)?;
        super::remove(self.inner.as_ref(), path)
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        self.check_write(path)?;
        super::remove_all(self.inner.as_ref(), path)
    }
}

impl FsRename for FilterFs {
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_write(from)?;
        if !self.allows(to) {
            return Err(Error::NotFound(to.to_path_buf()));
        }
        super::rename(self.inner.as_ref(), from, to)
    }
}

impl FsChmod for FilterFs {
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.check_write(path)?;
        super::chmod(self.inner.as_ref(), path, mode)
    }
}

impl FsChtimes for FilterFs {
    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        self.check_write(path)?;
        super::chtimes(self.inner.as_ref(), path, accessed, modified)
    }
}

/// Handle opened through a [`FilterFs`]
pub struct FilterFile {
    inner: Box<dyn File>,
    /// Path the handle was opened at, used to build child paths
    dir: std::path::PathBuf,
    predicate: Predicate,
    read_only: bool,
    /// Filtered listing, fetched on first read_dir
    listing: Option<Vec<DirEntry>>,
    cursor: usize,
}

impl File for FilterFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn stat(&self) -> Result<FileInfo> {
        self.inner.stat()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn as_writer(&mut self) -> Option<&mut dyn FileWrite> {
        if self.read_only {
            return None;
        }
        self.inner.as_writer()
    }

    fn as_seeker(&mut self) -> Option<&mut dyn FileSeek> {
        self.inner.as_seeker()
    }

    fn as_dir(&mut self) -> Option<&mut dyn FileReadDir> {
        if self.inner.as_dir().is_none() {
            return None;
        }
        Some(self)
    }
}

impl FileReadDir for FilterFile {
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>> {
        if self.listing.is_none() {
            let entries = super::read_dir(self.inner.as_mut(), 0)?;
            let kept = entries
                .into_iter()
                .filter(|e| e.is_dir() || (self.predicate)(&self.dir.join(e.name())))
                .collect();
            self.listing = Some(kept);
        }
        match &self.listing {
            Some(entries) => paginate(entries, &mut self.cursor, n),
            None => Ok(Vec::new()),
        }
    }
}
