//! Directory listing merge strategies
//!
//! A merge combines the overlay listing and the base listing of one
//! directory into a single listing. Strategies are pure: the same inputs
//! always produce the same entries in the same order.

use crate::error::Result;
use crate::metadata::DirEntry;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Signature of a merge function: `(overlay, base) -> merged`
pub type MergeFn = dyn Fn(&[DirEntry], &[DirEntry]) -> Result<Vec<DirEntry>> + Send + Sync;

/// Pluggable precedence rule for merged directory listings
#[derive(Clone)]
pub struct MergeStrategy {
    name: &'static str,
    func: Arc<MergeFn>,
}

impl MergeStrategy {
    /// Overlay entries first, then base entries not named in the overlay
    pub fn overlay_first() -> Self {
        Self {
            name: "overlay-first",
            func: Arc::new(overlay_first),
        }
    }

    /// Base entries first, then overlay entries not named in the base
    pub fn base_first() -> Self {
        Self {
            name: "base-first",
            func: Arc::new(base_first),
        }
    }

    /// Caller-supplied merge
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&[DirEntry], &[DirEntry]) -> Result<Vec<DirEntry>> + Send + Sync + 'static,
    {
        Self {
            name: "custom",
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Merge the overlay listing with the base listing
    pub fn merge(&self, overlay: &[DirEntry], base: &[DirEntry]) -> Result<Vec<DirEntry>> {
        (self.func)(overlay, base)
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::overlay_first()
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeStrategy")
            .field("name", &self.name)
            .finish()
    }
}

/// `winner` in its own order, followed by `loser` entries whose names the
/// winner does not already use
fn shadowed_union(winner: &[DirEntry], loser: &[DirEntry]) -> Vec<DirEntry> {
    let seen: HashSet<&str> = winner.iter().map(DirEntry::name).collect();

    let mut merged = Vec::with_capacity(winner.len() + loser.len());
    merged.extend_from_slice(winner);
    merged.extend(loser.iter().filter(|e| !seen.contains(e.name())).cloned());
    merged
}

/// Default merge: the overlay holds the most recently written state, so a
/// base entry sharing a name with an overlay entry is dropped outright.
pub fn overlay_first(overlay: &[DirEntry], base: &[DirEntry]) -> Result<Vec<DirEntry>> {
    Ok(shadowed_union(overlay, base))
}

pub fn base_first(overlay: &[DirEntry], base: &[DirEntry]) -> Result<Vec<DirEntry>> {
    Ok(shadowed_union(base, overlay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metadata::FileInfo;
    use std::time::SystemTime;

    fn file(name: &str, size: u64) -> DirEntry {
        DirEntry::new(FileInfo::file(name, size, 0o644, SystemTime::UNIX_EPOCH))
    }

    fn dir(name: &str) -> DirEntry {
        DirEntry::new(FileInfo::directory(name, 0o755, SystemTime::UNIX_EPOCH))
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_overlay_first_order_and_precedence() {
        let overlay = vec![file("z", 1), file("b", 1)];
        let base = vec![file("a", 2), file("b", 2), file("c", 2)];

        let merged = MergeStrategy::overlay_first().merge(&overlay, &base).unwrap();
        assert_eq!(names(&merged), ["z", "b", "a", "c"]);
        // Collision keeps the overlay entry
        assert_eq!(merged[1].info().size, 1);
    }

    #[test]
    fn test_overlay_wins_regardless_of_kind() {
        let overlay = vec![file("x", 0)];
        let base = vec![dir("x")];

        let merged = overlay_first(&overlay, &base).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_dir());
    }

    #[test]
    fn test_merge_is_stable() {
        let overlay = vec![file("q", 0), file("m", 0)];
        let base = vec![file("m", 0), file("a", 0), dir("d")];
        let strategy = MergeStrategy::default();

        let first = strategy.merge(&overlay, &base).unwrap();
        for _ in 0..5 {
            assert_eq!(strategy.merge(&overlay, &base).unwrap(), first);
        }
    }

    #[test]
    fn test_base_first() {
        let overlay = vec![file("b", 1), file("o", 1)];
        let base = vec![file("a", 2), file("b", 2)];

        let merged = MergeStrategy::base_first().merge(&overlay, &base).unwrap();
        assert_eq!(names(&merged), ["a", "b", "o"]);
        assert_eq!(merged[1].info().size, 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(overlay_first(&[], &[]).unwrap().is_empty());
        assert_eq!(names(&overlay_first(&[], &[file("a", 0)]).unwrap()), ["a"]);
    }

    #[test]
    fn test_custom_strategy_can_fail() {
        let strategy = MergeStrategy::custom(|overlay: &[DirEntry], base: &[DirEntry]| {
            if overlay.iter().any(|e| base.iter().any(|b| b.name() == e.name())) {
                return Err(Error::Merge("name collision".to_string()));
            }
            overlay_first(overlay, base)
        });

        assert_eq!(strategy.name(), "custom");
        assert!(strategy.merge(&[file("a", 0)], &[file("b", 0)]).is_ok());
        assert!(matches!(
            strategy.merge(&[file("a", 0)], &[file("a", 0)]),
            Err(Error::Merge(_))
        ));
    }
}
