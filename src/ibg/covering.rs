//! Covering-node lookup.
//!
//! A node `N` covers a target configuration `C` when `N.config ⊇ C` and the
//! indexes used by `N`'s plan are all in `C`. Such a node certifies
//! `cost(C) == N.cost` without a what-if call.
//!
//! Two searches are provided:
//! - [`descend`]: from an ancestor, repeatedly follow the first child edge
//!   whose removed index is not in the target. Cost is bounded by the size of
//!   the used sets along one path.
//! - [`CoveringNodeFinder`]: breadth-first search resolving several targets in
//!   one traversal, pruning unexpanded nodes and nodes that are not supersets
//!   of any unresolved target.

use super::graph::GraphView;
use super::index_set::IndexSet;
use super::node::{Node, NodeId};
use crate::{Error, Result};
use std::collections::VecDeque;

/// Outcome of a fast descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descent {
    Covered(NodeId),
    /// The path reached a node whose expansion is not published yet.
    Unexpanded(NodeId),
}

impl Descent {
    pub fn covered(self) -> Option<NodeId> {
        match self {
            Descent::Covered(id) => Some(id),
            Descent::Unexpanded(_) => None,
        }
    }
}

pub fn is_covering(node: &Node, target: &IndexSet) -> bool {
    node.expansion()
        .is_some_and(|e| node.config().is_superset_of(target) && e.used().is_subset_of(target))
}

pub(crate) fn check_covering(node: &Node, target: &IndexSet) -> Result<()> {
    if is_covering(node, target) {
        Ok(())
    } else {
        Err(Error::GraphInconsistency(format!(
            "node {} with configuration {} does not cover {}",
            node.id(),
            node.config(),
            target
        )))
    }
}

/// Fast descent from `start`, which must be an ancestor of `target`
/// (its configuration a superset of it). The root always qualifies.
pub fn descend(view: &GraphView<'_>, start: NodeId, target: &IndexSet) -> Descent {
    debug_assert!(view.node(start).config().is_superset_of(target));
    let mut current = start;
    loop {
        let Some(expansion) = view.node(current).expansion() else {
            return Descent::Unexpanded(current);
        };
        match expansion.children().iter().find(|e| !target.contains(e.index)) {
            Some(edge) => current = edge.child,
            None => {
                debug_assert!(is_covering(view.node(current), target));
                return Descent::Covered(current);
            }
        }
    }
}

/// Result of a multi-target breadth-first search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Covering node per target, in target order.
    pub found: Vec<Option<NodeId>>,
    /// First unexpanded node met that was a superset of an unresolved target.
    ///
    /// When this is `None` the traversal never depended on unpublished state,
    /// so the answers are final for this graph.
    pub pending: Option<NodeId>,
    pub visited: usize,
}

impl CoverageReport {
    pub fn is_final(&self) -> bool {
        self.pending.is_none()
    }

    pub fn all_found(&self) -> bool {
        self.found.iter().all(Option::is_some)
    }
}

/// Breadth-first covering search with reusable scratch buffers.
#[derive(Debug, Default)]
pub struct CoveringNodeFinder {
    queue: VecDeque<NodeId>,
    seen: Vec<bool>,
}

impl CoveringNodeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&mut self, view: &GraphView<'_>, start: NodeId, target: &IndexSet) -> Option<NodeId> {
        let report = self.find_many(view, start, std::slice::from_ref(target));
        report.found.into_iter().next().flatten()
    }

    pub fn find_many(
        &mut self,
        view: &GraphView<'_>,
        start: NodeId,
        targets: &[IndexSet],
    ) -> CoverageReport {
        let mut report = CoverageReport {
            found: vec![None; targets.len()],
            pending: None,
            visited: 0,
        };
        let mut unresolved = targets.len();
        if unresolved == 0 {
            return report;
        }

        self.queue.clear();
        self.seen.clear();
        self.seen.resize(view.len(), false);
        self.queue.push_back(start);
        self.seen[start.index()] = true;

        while let Some(id) = self.queue.pop_front() {
            let node = view.node(id);
            let config = node.config();
            let relevant = targets
                .iter()
                .zip(report.found.iter())
                .any(|(t, f)| f.is_none() && config.is_superset_of(t));
            if !relevant {
                continue;
            }
            let Some(expansion) = node.expansion() else {
                report.pending.get_or_insert(id);
                continue;
            };
            report.visited += 1;

            for (target, slot) in targets.iter().zip(report.found.iter_mut()) {
                if slot.is_none() && config.is_superset_of(target) && expansion.used().is_subset_of(target) {
                    *slot = Some(id);
                    unresolved -= 1;
                }
            }
            if unresolved == 0 {
                break;
            }

            for edge in expansion.children() {
                let seen = &mut self.seen[edge.child.index()];
                if !*seen {
                    *seen = true;
                    self.queue.push_back(edge.child);
                }
            }
        }

        report
    }
}
