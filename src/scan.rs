//! Axis-based traversal over the filesystem tree.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::path;
use crate::stats::Stats;

/// Which entries related to the target a scan visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Every ancestor of the target, nearest first.
    Ancestors,
    /// The target, then every ancestor.
    AncestorsOrSelf,
    /// Only the target.
    SelfOnly,
    /// The target, then everything beneath it in name order.
    DescendantsOrSelf,
    /// Everything beneath the target in name order.
    Descendants,
}

/// Predicates steering a scan. Both default to "always".
///
/// `accept` filters which visited paths are emitted; `traverse` gates
/// whether a directory's children (or the next ancestor) are visited at
/// all.
#[derive(Default)]
pub struct Traversal<'a> {
    /// Emit this path in the results.
    pub accept: Option<Box<dyn Fn(&str, &Stats) -> bool + 'a>>,
    /// Continue past this directory.
    pub traverse: Option<Box<dyn Fn(&str, &Stats) -> bool + 'a>>,
}

impl<'a> Traversal<'a> {
    /// A traversal visiting and emitting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the emission filter.
    #[must_use]
    pub fn accept(mut self, f: impl Fn(&str, &Stats) -> bool + 'a) -> Self {
        self.accept = Some(Box::new(f));
        self
    }

    /// Sets the descent gate.
    #[must_use]
    pub fn traverse(mut self, f: impl Fn(&str, &Stats) -> bool + 'a) -> Self {
        self.traverse = Some(Box::new(f));
        self
    }
}

impl FileSystem {
    /// Paths related to `path` along `axis`, following symlinks.
    ///
    /// The target itself must resolve; errors met while visiting
    /// children or ancestors are silently skipped so one unreadable
    /// entry does not poison the enumeration.
    pub fn scan_sync(&self, path: &str, axis: Axis, traversal: &Traversal<'_>) -> Result<Vec<String>> {
        self.scan_impl(path, axis, traversal, false)
    }

    /// Like [`scan_sync`](Self::scan_sync) but entries are stat'd
    /// without following symlinks, so links are listed, not traversed
    /// through.
    pub fn lscan_sync(&self, path: &str, axis: Axis, traversal: &Traversal<'_>) -> Result<Vec<String>> {
        self.scan_impl(path, axis, traversal, true)
    }

    fn scan_impl(
        &self,
        path: &str,
        axis: Axis,
        traversal: &Traversal<'_>,
        no_follow: bool,
    ) -> Result<Vec<String>> {
        let resolved = self.resolve_in(path)?;
        let stats = self.stat_for_scan(&resolved, no_follow)?;
        let mut results = Vec::new();
        self.scan_node(&resolved, &stats, axis, traversal, no_follow, &mut results);
        Ok(results)
    }

    fn scan_node(
        &self,
        path: &str,
        stats: &Stats,
        axis: Axis,
        traversal: &Traversal<'_>,
        no_follow: bool,
        results: &mut Vec<String>,
    ) {
        if matches!(
            axis,
            Axis::AncestorsOrSelf | Axis::SelfOnly | Axis::DescendantsOrSelf
        ) && traversal.accept.as_ref().is_none_or(|f| f(path, stats))
        {
            results.push(path.to_string());
        }
        if matches!(axis, Axis::Ancestors | Axis::AncestorsOrSelf) {
            let dirname = path::dirname(path);
            if dirname != path {
                if let Ok(stats) = self.stat_for_scan(&dirname, no_follow) {
                    if traversal.traverse.as_ref().is_none_or(|f| f(&dirname, &stats)) {
                        self.scan_node(
                            &dirname,
                            &stats,
                            Axis::AncestorsOrSelf,
                            traversal,
                            no_follow,
                            results,
                        );
                    }
                }
            }
        }
        if matches!(axis, Axis::DescendantsOrSelf | Axis::Descendants)
            && stats.is_directory()
            && traversal.traverse.as_ref().is_none_or(|f| f(path, stats))
        {
            if let Ok(names) = self.readdir_sync(path) {
                for name in names {
                    let child = path::combine(path, &name);
                    if let Ok(stats) = self.stat_for_scan(&child, no_follow) {
                        self.scan_node(
                            &child,
                            &stats,
                            Axis::DescendantsOrSelf,
                            traversal,
                            no_follow,
                            results,
                        );
                    }
                }
            }
        }
    }

    fn stat_for_scan(&self, path: &str, no_follow: bool) -> Result<Stats> {
        if no_follow {
            self.lstat_sync(path)
        } else {
            self.stat_sync(path)
        }
    }
}
