//! Overlay file handle
//!
//! Fans reads, writes and listings out across a base handle and an
//! overlay handle. Either handle may be absent. A single handle is not
//! meant to be shared between threads without outside locking.

use crate::error::{Error, Result};
use crate::fs::{self as vfs, File, FileReadDir, FileSeek, FileWrite};
use crate::metadata::{DirEntry, FileInfo};
use std::io::SeekFrom;
use tracing::warn;

use super::MergeStrategy;

/// Listing state owned by one handle
#[derive(Debug, Default)]
struct Listing {
    /// Raw entries per side, kept until a merge succeeds. A side is fetched
    /// at most once, so a retry only reads the side that failed.
    overlay: Option<Vec<DirEntry>>,
    base: Option<Vec<DirEntry>>,
    /// Merged listing, computed at most once
    merged: Option<Vec<DirEntry>>,
    cursor: usize,
}

/// File handle over a base handle and an overlay handle
pub struct OverlayFile {
    base: Option<Box<dyn File>>,
    overlay: Option<Box<dyn File>>,
    merge: MergeStrategy,
    listing: Listing,
}

impl OverlayFile {
    pub fn new(
        base: Option<Box<dyn File>>,
        overlay: Option<Box<dyn File>>,
        merge: MergeStrategy,
    ) -> Self {
        Self {
            base,
            overlay,
            merge,
            listing: Listing::default(),
        }
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    fn merged_entries(&mut self) -> Result<&[DirEntry]> {
        if self.listing.merged.is_none() {
            if self.base.is_none() && self.overlay.is_none() {
                return Err(Error::BadDescriptor);
            }
            if self.listing.overlay.is_none() {
                self.listing.overlay = Some(list_all(self.overlay.as_mut())?);
            }
            if self.listing.base.is_none() {
                self.listing.base = Some(list_all(self.base.as_mut())?);
            }

            let overlay = self.listing.overlay.as_deref().unwrap_or(&[]);
            let base = self.listing.base.as_deref().unwrap_or(&[]);
            let merged = self.merge.merge(overlay, base)?;
            self.listing.merged = Some(merged);
            self.listing.overlay = None;
            self.listing.base = None;
        }

        Ok(self.listing.merged.as_deref().unwrap_or(&[]))
    }
}

/// Every entry a handle can list. A handle without listing support
/// contributes nothing.
fn list_all(file: Option<&mut Box<dyn File>>) -> Result<Vec<DirEntry>> {
    let Some(file) = file else {
        return Ok(Vec::new());
    };
    if file.as_dir().is_none() {
        warn!("{}: handle cannot list entries, treating as empty", file.name());
        return Ok(Vec::new());
    }
    vfs::read_dir(file.as_mut(), 0)
}

impl File for OverlayFile {
    fn name(&self) -> &str {
        match (&self.overlay, &self.base) {
            (Some(f), _) | (None, Some(f)) => f.name(),
            (None, None) => "",
        }
    }

    /// Read from the overlay, advancing the base cursor by the same count.
    ///
    /// A failed base seek after a good overlay read is reported as
    /// `Error::PartialRead` carrying the count already placed in `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(overlay) = self.overlay.as_mut() {
            let n = overlay.read(buf)?;
            // Keep the base cursor in step, since writes go to both
            if let Some(base) = self.base.as_mut() {
                if let Err(e) = vfs::seek(base.as_mut(), SeekFrom::Current(n as i64)) {
                    return Err(Error::PartialRead {
                        read: n,
                        source: Box::new(e),
                    });
                }
            }
            return Ok(n);
        }

        match self.base.as_mut() {
            Some(base) => base.read(buf),
            None => Err(Error::BadDescriptor),
        }
    }

    fn stat(&self) -> Result<FileInfo> {
        match (&self.overlay, &self.base) {
            (Some(f), _) | (None, Some(f)) => f.stat(),
            (None, None) => Err(Error::BadDescriptor),
        }
    }

    /// Close base first, then overlay, so a base store that touches
    /// timestamps on close cannot make the overlay copy look stale.
    fn close(&mut self) -> Result<()> {
        if self.base.is_none() && self.overlay.is_none() {
            return Err(Error::BadDescriptor);
        }

        let base_result = self.base.take().map(|mut f| f.close());
        let overlay_result = self.overlay.take().map(|mut f| f.close());

        match (base_result, overlay_result) {
            (Some(Err(b)), Some(Err(o))) => Err(Error::join(b, o)),
            (Some(Err(e)), _) | (_, Some(Err(e))) => Err(e),
            _ => Ok(()),
        }
    }

    fn as_writer(&mut self) -> Option<&mut dyn FileWrite> {
        Some(self)
    }

    fn as_seeker(&mut self) -> Option<&mut dyn FileSeek> {
        Some(self)
    }

    fn as_dir(&mut self) -> Option<&mut dyn FileReadDir> {
        Some(self)
    }
}

impl FileWrite for OverlayFile {
    /// Write to the overlay, then replicate to the base.
    ///
    /// A failed overlay write leaves the base untouched. A failed base write
    /// after a good overlay write is reported as `Error::PartialWrite`
    /// carrying the overlay byte count.
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match (self.overlay.as_mut(), self.base.as_mut()) {
            (Some(overlay), base) => {
                let n = vfs::write(overlay.as_mut(), buf)?;
                if let Some(base) = base {
                    if let Err(e) = vfs::write(base.as_mut(), buf) {
                        return Err(Error::PartialWrite {
                            written: n,
                            source: Box::new(e),
                        });
                    }
                }
                Ok(n)
            }
            (None, Some(base)) => vfs::write(base.as_mut(), buf),
            (None, None) => Err(Error::BadDescriptor),
        }
    }
}

impl FileSeek for OverlayFile {
    /// Seek the overlay and then the base; reports the overlay position
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match (self.overlay.as_mut(), self.base.as_mut()) {
            (Some(overlay), base) => {
                let at = vfs::seek(overlay.as_mut(), pos)?;
                if let Some(base) = base {
                    vfs::seek(base.as_mut(), pos)?;
                }
                Ok(at)
            }
            (None, Some(base)) => vfs::seek(base.as_mut(), pos),
            (None, None) => Err(Error::BadDescriptor),
        }
    }
}

impl FileReadDir for OverlayFile {
    /// Listing merged once from both handles, then paginated.
    fn read_dir(&mut self, n: i64) -> Result<Vec<DirEntry>> {
        self.merged_entries()?;
        match &self.listing.merged {
            Some(entries) => vfs::paginate(entries, &mut self.listing.cursor, n),
            None => Ok(Vec::new()),
        }
    }
}
