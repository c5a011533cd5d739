//! Overlay construction options

use std::time::Duration;

use super::MergeStrategy;

/// Settings fixed when an overlay is constructed
#[derive(Debug, Clone, Default)]
pub struct OverlayOptions {
    /// How long an overlay copy is trusted before the base is consulted
    /// again. Zero trusts a populated overlay forever.
    pub cache_duration: Duration,

    /// Precedence rule for merged directory listings
    pub merge: MergeStrategy,
}

impl OverlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_duration(mut self, cache_duration: Duration) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }
}
