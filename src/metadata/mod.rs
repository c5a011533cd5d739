//! Metadata module
//!
//! Store-independent file metadata and directory entries.

mod info;

pub use info::{DirEntry, FileInfo, FileType};
