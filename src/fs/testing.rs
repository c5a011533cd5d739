//! Fault-injecting store for tests

use crate::error::{Error, Result};
use crate::metadata::{DirEntry, FileInfo};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::{
    File, FileReadDir, FileSeek, FileWrite, Filesystem, FsChtimes, FsCreate, FsMkdir, FsRemove,
    FsStat, MemFs,
};

/// Failures to inject
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// Handle writes fail
    pub write: bool,
    /// Handle close fails (after releasing the inner handle)
    pub close: bool,
    /// Path chtimes fails
    pub chtimes: bool,
    /// Handle stat over-reports the size by one byte
    pub size_skew: bool,
    /// Handles never expose a writer
    pub no_writer: bool,
    /// Store has no stat capability
    pub no_stat: bool,
    /// First directory listing on each handle fails
    pub list_once: bool,
}

fn injected(what: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("injected {} failure", what),
    ))
}

/// [`MemFs`] wrapper that counts opens and fails on demand
pub struct FaultyFs {
    inner: Arc<MemFs>,
    faults: Faults,
    opens: AtomicUsize,
}

impl FaultyFs {
    pub fn new(inner: Arc<MemFs>, faults: Faults) -> Self {
        Self {
            inner,
            faults,
            opens: AtomicUsize::new(0),
        }
    }

    /// Number of successful `open` calls so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn wrap(&self, inner: Box<dyn File>) -> Box<dyn File> {
        Box::new(FaultyFile {
            inner,
            faults: self.faults,
            listed: false,
        })
    }
}

impl Filesystem for FaultyFs {
    fn name(&self) -> &str {
        "faulty"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        let file = self.inner.open(path)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.wrap(file))
    }

    fn as_stat(&self) -> Option<&dyn FsStat> {
        if self.faults.no_stat {
            None
        } else {
            Some(self)
        }
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

    fn as_chtimes(&self) -> Option<&dyn FsChtimes> {
        Some(self)
    }
}

impl FsStat for FaultyFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        super::stat(self.inner.as_ref(), path)
    }
}

impl FsCreate for FaultyFs {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let file = super::create(self.inner.as_ref(), path)?;
        Ok(self.wrap(file))
    }
}

impl FsMkdir for FaultyFs {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        super::mkdir(self.inner.as_ref(), path, mode)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        super::mkdir_all(self.inner.as_ref(), path, mode)
    }
}

impl FsRemove for FaultyFs {
    fn remove(&self, path: &Path) -> Result<()> {
        super::remove(self.inner.as_ref(), path)
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        super::remove_all(self.inner.as_ref(), path)
    }
}

impl FsChtimes for FaultyFs {
    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        if self.faults.chtimes {
            return Err(injected("chtimes"));
        }
        super::chtimes(self.inner.as_ref(), path, accessed, modified)
    }
}

pub struct FaultyFile {
    inner: Box<dyn File>,
    faults: Faults,
    /// A listing has been attempted on this handle
    listed: bool,
}

impl File for FaultyFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn stat(&self) -> Result<FileInfo> {
        let mut info = self.inner.stat()?;
        if self.faults.size_skew {
            info.size += 1;
        }
        Ok(info)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        if self.faults.close {
            return Err(injected("close"));
        }
        Ok(())
    }

    fn as_writer(&mut self) -> Option<&mut dyn FileWrite> {
        if self.faults.no_writer || self.inner.as_writer().is_none() {
            return None;
        }
        Some(self)
    }

    fn as_seeker(&mut self) -> Option<&mut dyn FileSeek> {
        self.inner.as_seeker()
    }

    fn as_dir(&mut self) -> Option<&mut dyn FileReadDir> {
        self.inner.as_dir()?;
        Some(self)
    }
}

impl FileReadDir for FaultyFile {
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>> {
        let first = !self.listed;
        self.listed = true;
        if self.faults.list_once && first {
            return Err(injected("listing"));
        }
        super::read_dir(self.inner.as_mut(), n)
    }
}

impl FileWrite for FaultyFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.faults.write {
            return Err(injected("write"));
        }
        super::write(self.inner.as_mut(), buf)
    }
}

/// Handle with no optional capabilities at all
pub struct PlainFile {
    pub name: String,
}

impl File for PlainFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn stat(&self) -> Result<FileInfo> {
        Ok(FileInfo::directory(self.name.clone(), 0o755, SystemTime::UNIX_EPOCH))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Seek helper used by tests that inspect cursor positions
pub fn position(file: &mut dyn File) -> u64 {
    super::seek(file, SeekFrom::Current(0)).unwrap()
}
