//! Error types for layerfs
//!
//! A single taxonomy shared by every backing store and view, so callers
//! can classify failures (not-exist, unsupported, bad descriptor, ...)
//! without knowing which store produced them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// OS code reported for operations on a handle with nothing behind it.
#[cfg(unix)]
pub const BAD_FD_CODE: i32 = libc::EBADF;

/// OS code reported for operations on a handle with nothing behind it
/// (`ERROR_INVALID_HANDLE`).
#[cfg(windows)]
pub const BAD_FD_CODE: i32 = 6;

#[cfg(not(any(unix, windows)))]
pub const BAD_FD_CODE: i32 = 9;

/// Result type alias for layerfs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for layerfs
#[derive(Error, Debug)]
pub enum Error {
    // Namespace errors
    #[error("No such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("File exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Is a directory: {}", .0.display())]
    IsADirectory(PathBuf),

    #[error("Directory not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    // Capability errors
    #[error("{op} {}: operation not supported", .path.display())]
    Unsupported { op: &'static str, path: PathBuf },

    #[error("Bad file descriptor (os error {})", BAD_FD_CODE)]
    BadDescriptor,

    // Overlay errors
    #[error("Copied {copied} bytes of {}, source reports {expected}", .path.display())]
    Integrity {
        path: PathBuf,
        copied: u64,
        expected: u64,
    },

    #[error("Wrote {written} bytes to overlay but base write failed: {source}")]
    PartialWrite {
        written: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Read {read} bytes from overlay but base seek failed: {source}")]
    PartialRead {
        read: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("End of directory listing")]
    EndOfListing,

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("{}", joined_message(.0))]
    Joined(Vec<Error>),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn joined_message(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Combine two errors so neither cause is lost
    pub fn join(first: Error, second: Error) -> Error {
        let mut errors = Vec::new();
        for err in [first, second] {
            match err {
                Error::Joined(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }
        Error::Joined(errors)
    }

    /// Underlying causes: the members of a joined error, or the error itself
    pub fn causes(&self) -> Box<dyn Iterator<Item = &Error> + '_> {
        match self {
            Error::Joined(errors) => Box::new(errors.iter()),
            other => Box::new(std::iter::once(other)),
        }
    }

    /// Stable not-exist check, independent of the store that produced the error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Error::Joined(errors) => !errors.is_empty() && errors.iter().all(Error::is_not_found),
            _ => false,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }

    pub fn is_bad_descriptor(&self) -> bool {
        matches!(self, Error::BadDescriptor)
    }

    pub fn is_end_of_listing(&self) -> bool {
        matches!(self, Error::EndOfListing)
    }

    /// Shorthand for an unsupported-operation error
    pub fn unsupported(op: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::Unsupported {
            op,
            path: path.into(),
        }
    }

    /// Map an OS error onto the taxonomy, attributing it to `path`
    pub fn from_io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.into()),
            io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.into()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.into()),
            _ => Error::Io(err),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Io(inner) => return inner,
            Error::BadDescriptor => return io::Error::from_raw_os_error(BAD_FD_CODE),
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            Error::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            Error::Unsupported { .. } => io::ErrorKind::Unsupported,
            Error::EndOfListing => io::ErrorKind::UnexpectedEof,
            Error::Integrity { .. } => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
