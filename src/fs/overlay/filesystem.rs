//! Overlay filesystem
//!
//! Serves reads from the overlay store, pulling files up from the base
//! store on first use and again whenever the cached copy has gone stale.
//! Directories are never copied; they are listed by merging both stores.

use crate::error::{Error, Result};
use crate::fs::{
    self as vfs, File, Filesystem, FsChmod, FsChtimes, FsCreate, FsMkdir, FsRemove, FsRename,
    FsStat,
};
use crate::metadata::FileInfo;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::{classify, ensure_parent, promote, CacheState, OverlayFile, OverlayOptions};

/// Overlay of a writable cache store on top of a base store
pub struct OverlayFs {
    /// Authoritative store
    base: Arc<dyn Filesystem>,
    /// Cache store that shadows the base
    overlay: Arc<dyn Filesystem>,
    options: OverlayOptions,
    name: String,
}

impl OverlayFs {
    /// Create a new overlay filesystem
    pub fn new(
        base: Arc<dyn Filesystem>,
        overlay: Arc<dyn Filesystem>,
        options: OverlayOptions,
    ) -> Self {
        let name = format!("{}+{}", overlay.name(), base.name());
        Self {
            base,
            overlay,
            options,
            name,
        }
    }

    pub fn base(&self) -> &Arc<dyn Filesystem> {
        &self.base
    }

    pub fn overlay(&self) -> &Arc<dyn Filesystem> {
        &self.overlay
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    pub fn cache_duration(&self) -> Duration {
        self.options.cache_duration
    }

    /// Freshness of the overlay copy of `path`
    pub fn classify(&self, path: &Path) -> Result<(CacheState, Option<FileInfo>)> {
        let (state, info) = classify(
            self.base.as_ref(),
            self.overlay.as_ref(),
            path,
            self.options.cache_duration,
        )?;
        debug!("classify {}: {}", path.display(), state);
        Ok((state, info))
    }

    /// Copy `path` from the base into the overlay now
    pub fn promote(&self, path: &Path) -> Result<()> {
        promote(self.base.as_ref(), self.overlay.as_ref(), path)
    }

    fn promote_and_open(&self, path: &Path) -> Result<Box<dyn File>> {
        self.promote(path)?;
        self.overlay.open(path)
    }

    /// Open `path` in both stores and wrap whatever opened.
    ///
    /// A not-exist failure on one side is tolerated when the other side
    /// opened. Any other failure closes the opened side and is returned.
    fn open_merged(&self, path: &Path) -> Result<Box<dyn File>> {
        let base = self.base.open(path);
        let overlay = self.overlay.open(path);

        let (base, overlay) = match (base, overlay) {
            (Ok(b), Ok(o)) => (Some(b), Some(o)),
            (Ok(b), Err(e)) if e.is_not_found() => (Some(b), None),
            (Err(e), Ok(o)) if e.is_not_found() => (None, Some(o)),
            (Err(e), Err(_)) => return Err(e),
            (Ok(mut opened), Err(e)) | (Err(e), Ok(mut opened)) => {
                return Err(match opened.close() {
                    Ok(()) => e,
                    Err(close_err) => Error::join(e, close_err),
                });
            }
        };

        Ok(Box::new(OverlayFile::new(
            base,
            overlay,
            self.options.merge.clone(),
        )))
    }

    /// Apply `op` to the base, then to the overlay.
    ///
    /// A not-exist failure on either side is tolerated as long as the other
    /// side had the path; when neither had it the base error is returned.
    fn apply_both<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&dyn Filesystem) -> Result<()>,
    {
        let base = op(self.base.as_ref());
        if let Err(e) = &base {
            if !e.is_not_found() {
                return base;
            }
        }

        match op(self.overlay.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => base,
            Err(e) => Err(e),
        }
    }
}

impl Filesystem for OverlayFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        let (state, info) = self.classify(path)?;
        debug!("open {} ({})", path.display(), state);

        let is_dir = info.as_ref().map(FileInfo::is_dir).unwrap_or(false);
        match state {
            CacheState::Local => self.overlay.open(path),
            CacheState::Hit if is_dir => self.open_merged(path),
            CacheState::Hit => self.overlay.open(path),
            CacheState::Stale if is_dir => self.open_merged(path),
            CacheState::Stale => self.promote_and_open(path),
            CacheState::Miss => {
                let base_info = vfs::stat(self.base.as_ref(), path)?;
                if base_info.is_dir() {
                    self.open_merged(path)
                } else {
                    self.promote_and_open(path)
                }
            }
        }
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

impl FsStat for OverlayFs {
    fn stat(&self, path: &Path) -> Result<FileInfo> {
        match self.classify(path)? {
            (CacheState::Miss, _) => vfs::stat(self.base.as_ref(), path),
            (CacheState::Stale, _) | (_, None) => vfs::stat(self.overlay.as_ref(), path),
            (_, Some(info)) => Ok(info),
        }
    }
}

impl FsCreate for OverlayFs {
    /// Create in the base, then in the overlay; writes go to both
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let mut base = vfs::create(self.base.as_ref(), path)?;

        let overlay = ensure_parent(self.overlay.as_ref(), path)
            .and_then(|()| vfs::create(self.overlay.as_ref(), path));
        match overlay {
            Ok(overlay) => Ok(Box::new(OverlayFile::new(
                Some(base),
                Some(overlay),
                self.options.merge.clone(),
            ))),
            Err(e) => Err(match base.close() {
                Ok(()) => e,
                Err(close_err) => Error::join(e, close_err),
            }),
        }
    }
}

impl FsMkdir for OverlayFs {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        vfs::mkdir(self.base.as_ref(), path, mode)?;
        vfs::mkdir_all(self.overlay.as_ref(), path, mode)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        vfs::mkdir_all(self.base.as_ref(), path, mode)?;
        vfs::mkdir_all(self.overlay.as_ref(), path, mode)
    }
}

impl FsRemove for OverlayFs {
    fn remove(&self, path: &Path) -> Result<()> {
        self.apply_both(|fs| vfs::remove(fs, path))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        self.apply_both(|fs| vfs::remove_all(fs, path))
    }
}

impl FsRename for OverlayFs {
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.apply_both(|fs| {
            ensure_parent(fs, to)?;
            vfs::rename(fs, from, to)
        })
    }
}

impl FsChmod for OverlayFs {
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.apply_both(|fs| vfs::chmod(fs, path, mode))
    }
}

impl FsChtimes for OverlayFs {
    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        self.apply_both(|fs| vfs::chtimes(fs, path, accessed, modified))
    }
}
