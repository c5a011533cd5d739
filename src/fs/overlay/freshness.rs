//! Cache freshness classification
//!
//! Decides, per path, whether the overlay copy can be served as-is.

use crate::error::Result;
use crate::fs::{self as vfs, Filesystem};
use crate::metadata::FileInfo;
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Freshness of the overlay copy of a path, recomputed on every open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No overlay copy
    Miss,
    /// Overlay copy expired and the base copy is newer
    Stale,
    /// Overlay copy usable as-is
    Hit,
    /// Overlay copy expired but the base has no usable copy; the overlay
    /// copy is authoritative
    Local,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheState::Miss => "miss",
            CacheState::Stale => "stale",
            CacheState::Hit => "hit",
            CacheState::Local => "local",
        };
        f.write_str(s)
    }
}

/// Classify `path`.
///
/// Returns the overlay metadata for `Hit` and `Local`, the base metadata
/// for `Stale`, and nothing for `Miss`. Only a not-exist overlay stat is
/// treated as a miss; any other overlay stat failure is returned.
pub fn classify(
    base: &dyn Filesystem,
    overlay: &dyn Filesystem,
    path: &Path,
    cache_duration: Duration,
) -> Result<(CacheState, Option<FileInfo>)> {
    let overlay_info = match vfs::stat(overlay, path) {
        Ok(info) => info,
        Err(e) if e.is_not_found() => return Ok((CacheState::Miss, None)),
        Err(e) => return Err(e),
    };

    if cache_duration.is_zero() {
        return Ok((CacheState::Hit, Some(overlay_info)));
    }

    let unexpired = overlay_info
        .modified
        .checked_add(cache_duration)
        .map(|expiry| SystemTime::now() < expiry)
        .unwrap_or(true);
    if unexpired {
        return Ok((CacheState::Hit, Some(overlay_info)));
    }

    let base_info = match vfs::stat(base, path) {
        Ok(info) => info,
        Err(e) => {
            debug!("{}: base stat failed after expiry, serving overlay copy: {}", path.display(), e);
            return Ok((CacheState::Local, Some(overlay_info)));
        }
    };

    if base_info.modified > overlay_info.modified {
        Ok((CacheState::Stale, Some(base_info)))
    } else {
        Ok((CacheState::Hit, Some(overlay_info)))
    }
}
