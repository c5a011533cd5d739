//! layerfs - Composable virtual filesystem views
//!
//! This library provides capability-probed filesystem traits, on-disk,
//! in-memory and filtering stores, and an overlay that caches files from a
//! slow base store in a fast overlay store, refreshing them once they expire.

pub mod config;
pub mod error;
pub mod fs;
pub mod metadata;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::fs::overlay::{CacheState, MergeStrategy, OverlayFile, OverlayFs, OverlayOptions};
    pub use crate::fs::{File, Filesystem, FilterFs, MemFs, OsFs};
    pub use crate::metadata::{DirEntry, FileInfo, FileType};
}
