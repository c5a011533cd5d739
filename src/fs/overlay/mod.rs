//! Overlay filesystem module
//!
//! Layers a writable cache store over a base store:
//! - Base: authoritative, usually slower store
//! - Overlay: fast local store holding promoted copies
//! - Result: reads served from the overlay, refreshed from the base once a
//!   copy outlives the configured cache duration

mod config;
mod file;
mod filesystem;
mod freshness;
mod merge;
mod promote;

pub use config::OverlayOptions;
pub use file::OverlayFile;
pub use filesystem::OverlayFs;
pub use freshness::{classify, CacheState};
pub use merge::{MergeFn, MergeStrategy};
pub use promote::{ensure_parent, promote};
