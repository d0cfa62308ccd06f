//! The index benefit graph: an arena of lazily expanded nodes.
//!
//! Nodes live in a single `Vec` owned by the graph and reference each other
//! by [`NodeId`]. One construction task appends and expands nodes; any number
//! of readers may traverse concurrently through a [`GraphView`], reading only
//! nodes whose expansion has been published.
//!
//! Readers that need a node which is not expanded yet block on the graph's
//! expansion signal, a mutex/condvar pair bumped after every expansion and on
//! completion or abort of construction.

use super::cancel::CancellationToken;
use super::constructor::ConstructionStats;
use super::covering::{self, CoveringNodeFinder, Descent};
use super::index_set::{IndexId, IndexSet};
use super::node::{Edge, Expansion, Node, NodeId};
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Lifecycle of a graph's construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Building,
    Complete,
    Aborted,
}

#[derive(Debug)]
struct SignalState {
    expansions: u64,
    last_expanded: Option<NodeId>,
    phase: BuildPhase,
}

/// Wake primitive between the single expander and its readers. Each
/// publication bumps `expansions`, records the expanded id and wakes every
/// waiter; waiters re-check their own node under the same lock.
#[derive(Debug)]
struct ExpansionSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

/// What a reader found after waiting for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeWait {
    Expanded,
    /// Construction finished without ever creating this id.
    Absent,
}

#[derive(Debug)]
pub struct IndexBenefitGraph {
    statement: usize,
    candidates: IndexSet,
    nodes: RwLock<Vec<Node>>,
    used: RwLock<IndexSet>,
    empty_cost: OnceLock<f64>,
    stats: OnceLock<ConstructionStats>,
    signal: ExpansionSignal,
}

/// Read access to the node arena. Holding a view blocks node creation, so
/// views are kept short and never held across a wait.
pub struct GraphView<'a> {
    nodes: RwLockReadGuard<'a, Vec<Node>>,
}

impl GraphView<'_> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn root(&self) -> &Node {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }
}

impl IndexBenefitGraph {
    /// Creates a graph holding only the unexpanded root for `candidates`.
    pub(crate) fn new(statement: usize, candidates: IndexSet) -> Self {
        let root = Node::new(NodeId::ROOT, candidates.clone());
        Self {
            statement,
            candidates,
            nodes: RwLock::new(vec![root]),
            used: RwLock::new(IndexSet::new()),
            empty_cost: OnceLock::new(),
            stats: OnceLock::new(),
            signal: ExpansionSignal {
                state: Mutex::new(SignalState {
                    expansions: 0,
                    last_expanded: None,
                    phase: BuildPhase::Building,
                }),
                cond: Condvar::new(),
            },
        }
    }

    pub fn statement(&self) -> usize {
        self.statement
    }

    pub fn candidates(&self) -> &IndexSet {
        &self.candidates
    }

    pub fn read(&self) -> GraphView<'_> {
        GraphView {
            nodes: self.nodes.read(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Union of the used sets of all expanded nodes.
    pub fn used_indexes(&self) -> IndexSet {
        self.used.read().clone()
    }

    pub fn is_index_used_anywhere(&self, id: IndexId) -> bool {
        self.used.read().contains(id)
    }

    pub fn empty_cost(&self) -> Option<f64> {
        self.empty_cost.get().copied()
    }

    pub fn stats(&self) -> Option<&ConstructionStats> {
        self.stats.get()
    }

    pub fn phase(&self) -> BuildPhase {
        self.signal.state.lock().phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == BuildPhase::Complete
    }

    /// Cost of `config` certified by a covering node.
    ///
    /// Ids outside the candidate set cannot affect this statement and are
    /// ignored. Fails if the graph is not yet expanded far enough to certify
    /// the answer.
    pub fn cost_of(&self, config: &IndexSet) -> Result<f64> {
        let target = config.intersection(&self.candidates);
        if target.is_empty() {
            if let Some(cost) = self.empty_cost() {
                return Ok(cost);
            }
        }

        let view = self.read();
        match covering::descend(&view, NodeId::ROOT, &target) {
            Descent::Covered(id) => {
                let node = view.node(id);
                covering::check_covering(node, &target)?;
                node.cost().ok_or_else(|| {
                    Error::GraphInconsistency(format!("covering node {} has no cost", id))
                })
            }
            Descent::Unexpanded(id) => Err(Error::GraphInconsistency(format!(
                "cost of {} needs unexpanded node {} in statement {}",
                target, id, self.statement
            ))),
        }
    }

    /// General breadth-first covering search from the root.
    pub fn find_covering(&self, config: &IndexSet) -> Option<NodeId> {
        let view = self.read();
        CoveringNodeFinder::new().find(&view, NodeId::ROOT, config)
    }

    pub(crate) fn add_node(&self, config: IndexSet) -> NodeId {
        let mut nodes = self.nodes.write();
        let id = NodeId::new(nodes.len());
        nodes.push(Node::new(id, config));
        id
    }

    /// Publishes the expansion of `id` and wakes every waiting reader.
    pub(crate) fn expand(&self, id: NodeId, expansion: Expansion) -> Result<()> {
        {
            let view = self.read();
            let node = view.get(id).ok_or_else(|| {
                Error::GraphInconsistency(format!("expand of unknown node {}", id))
            })?;
            let used = expansion.used.clone();
            node.expand(expansion)?;
            self.used.write().union_with(&used);
        }

        let mut state = self.signal.state.lock();
        state.expansions += 1;
        state.last_expanded = Some(id);
        self.signal.cond.notify_all();
        Ok(())
    }

    pub(crate) fn set_empty_cost(&self, cost: f64) -> Result<()> {
        self.empty_cost.set(cost).map_err(|_| {
            Error::GraphInconsistency(format!(
                "empty cost of statement {} set twice",
                self.statement
            ))
        })
    }

    pub(crate) fn finish(&self, stats: ConstructionStats) {
        let _ = self.stats.set(stats);
        self.set_phase(BuildPhase::Complete);
    }

    pub(crate) fn abort(&self) {
        self.set_phase(BuildPhase::Aborted);
    }

    fn set_phase(&self, phase: BuildPhase) {
        let mut state = self.signal.state.lock();
        state.phase = phase;
        self.signal.cond.notify_all();
    }

    /// Number of expansions published so far.
    pub fn expansions(&self) -> u64 {
        self.signal.state.lock().expansions
    }

    /// Most recently published node, if any.
    pub fn last_expanded(&self) -> Option<NodeId> {
        self.signal.state.lock().last_expanded
    }

    /// Non-blocking probe used by the round-robin analysis driver.
    pub fn probe_node(&self, id: NodeId) -> Result<Option<NodeWait>> {
        let state = self.signal.state.lock();
        self.check_node(id, state.phase)
    }

    /// Blocks until node `id` is expanded, or construction ends without it.
    ///
    /// Spurious and timeout wakes re-check the predicate; only cancellation
    /// ends the wait early.
    pub fn wait_for_node(
        &self,
        id: NodeId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<NodeWait> {
        let mut state = self.signal.state.lock();
        loop {
            if let Some(found) = self.check_node(id, state.phase)? {
                return Ok(found);
            }
            if cancel.is_cancelled() {
                return Err(Error::Interrupted);
            }
            self.signal.cond.wait_for(&mut state, timeout);
        }
    }

    fn check_node(&self, id: NodeId, phase: BuildPhase) -> Result<Option<NodeWait>> {
        if phase == BuildPhase::Aborted {
            return Err(Error::ConstructionAborted {
                statement: self.statement,
            });
        }
        let view = self.read();
        match view.get(id) {
            Some(node) if node.is_expanded() => Ok(Some(NodeWait::Expanded)),
            Some(_) if phase == BuildPhase::Complete => Err(Error::GraphInconsistency(format!(
                "node {} left unexpanded in complete graph",
                id
            ))),
            None if phase == BuildPhase::Complete => Ok(Some(NodeWait::Absent)),
            _ => Ok(None),
        }
    }

    /// Exclusive access for repair passes that run after construction.
    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Node> {
        self.nodes.get_mut()
    }

    pub(crate) fn empty_cost_mut(&mut self) -> Option<&mut f64> {
        self.empty_cost.get_mut()
    }

    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        if !self.is_complete() {
            return Err(Error::GraphInconsistency(format!(
                "snapshot of incomplete graph for statement {}",
                self.statement
            )));
        }
        let view = self.read();
        let mut nodes = Vec::with_capacity(view.len());
        for node in view.iter() {
            let expansion = node.expansion().ok_or_else(|| {
                Error::GraphInconsistency(format!("node {} unexpanded", node.id()))
            })?;
            nodes.push(NodeRecord {
                id: node.id(),
                config: node.config().clone(),
                cost: expansion.cost,
                used: expansion.used.clone(),
                children: expansion.children.clone(),
            });
        }
        Ok(GraphSnapshot {
            statement: self.statement,
            candidates: self.candidates.clone(),
            empty_cost: self.empty_cost(),
            nodes,
        })
    }

    /// Rebuilds a complete graph, checking the structural invariants.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let GraphSnapshot {
            statement,
            candidates,
            empty_cost,
            nodes: records,
        } = snapshot;

        let root = records
            .first()
            .ok_or_else(|| Error::GraphInconsistency("snapshot has no nodes".to_string()))?;
        if root.config != candidates {
            return Err(Error::GraphInconsistency(format!(
                "root configuration {} differs from candidates {}",
                root.config, candidates
            )));
        }

        for (position, record) in records.iter().enumerate() {
            if record.id.index() != position {
                return Err(Error::GraphInconsistency(format!(
                    "node {} stored at position {}",
                    record.id, position
                )));
            }
            let mut edge_indexes = IndexSet::new();
            for edge in &record.children {
                let child = records.get(edge.child.index()).ok_or_else(|| {
                    Error::GraphInconsistency(format!(
                        "node {} points at missing child {}",
                        record.id, edge.child
                    ))
                })?;
                if !record.config.contains(edge.index)
                    || child.config != record.config.without(edge.index)
                {
                    return Err(Error::GraphInconsistency(format!(
                        "edge {} -{}-> {} does not remove exactly one index",
                        record.id, edge.index, edge.child
                    )));
                }
                edge_indexes.set(edge.index);
            }
            if edge_indexes != record.used {
                return Err(Error::GraphInconsistency(format!(
                    "node {} used set {} differs from its edges {}",
                    record.id, record.used, edge_indexes
                )));
            }
        }

        let graph = IndexBenefitGraph::new(statement, candidates);
        let mut expanded = Vec::with_capacity(records.len());
        for record in records {
            let id = if record.id == NodeId::ROOT {
                NodeId::ROOT
            } else {
                graph.add_node(record.config)
            };
            expanded.push((id, record.cost, record.used, record.children));
        }
        for (id, cost, used, children) in expanded {
            graph.expand(
                id,
                Expansion {
                    cost,
                    used,
                    children,
                },
            )?;
        }
        if let Some(cost) = empty_cost {
            graph.set_empty_cost(cost)?;
        }
        let node_count = graph.node_count();
        graph.finish(ConstructionStats {
            node_count,
            ..ConstructionStats::default()
        });
        Ok(graph)
    }
}

/// Serialized form of one expanded node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub config: IndexSet,
    pub cost: f64,
    pub used: IndexSet,
    pub children: Vec<Edge>,
}

/// Serialized form of a complete graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub statement: usize,
    pub candidates: IndexSet,
    pub empty_cost: Option<f64>,
    pub nodes: Vec<NodeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn leaf(cost: f64) -> Expansion {
        Expansion {
            cost,
            used: IndexSet::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_new_graph_has_unexpanded_root() {
        let graph = IndexBenefitGraph::new(0, IndexSet::from_ids([0, 1]));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.phase(), BuildPhase::Building);
        assert!(!graph.read().root().is_expanded());
        assert!(graph.cost_of(&IndexSet::from_ids([0])).is_err());
    }

    #[test]
    fn test_expand_publishes_used_set() {
        let graph = IndexBenefitGraph::new(0, IndexSet::from_ids([0, 1]));
        let child = graph.add_node(IndexSet::from_ids([1]));
        graph
            .expand(
                NodeId::ROOT,
                Expansion {
                    cost: 10.0,
                    used: IndexSet::from_ids([0]),
                    children: vec![Edge { index: 0, child }],
                },
            )
            .unwrap();

        assert!(graph.is_index_used_anywhere(0));
        assert!(!graph.is_index_used_anywhere(1));
        assert_eq!(graph.expansions(), 1);
        assert_eq!(graph.probe_node(child).unwrap(), None);
        assert_eq!(graph.probe_node(NodeId::ROOT).unwrap(), Some(NodeWait::Expanded));
    }

    #[test]
    fn test_signal_names_each_expanded_node() {
        let graph = IndexBenefitGraph::new(0, IndexSet::from_ids([0]));
        assert_eq!(graph.last_expanded(), None);

        let child = graph.add_node(IndexSet::new());
        graph
            .expand(
                NodeId::ROOT,
                Expansion {
                    cost: 5.0,
                    used: IndexSet::from_ids([0]),
                    children: vec![Edge { index: 0, child }],
                },
            )
            .unwrap();
        assert_eq!(graph.last_expanded(), Some(NodeId::ROOT));

        graph.expand(child, leaf(9.0)).unwrap();
        assert_eq!(graph.last_expanded(), Some(child));
        assert_eq!(graph.expansions(), 2);

        // A rejected second expansion publishes nothing.
        assert!(graph.expand(NodeId::ROOT, leaf(1.0)).is_err());
        assert_eq!(graph.last_expanded(), Some(child));
        assert_eq!(graph.expansions(), 2);
    }

    #[test]
    fn test_waiter_wakes_on_expansion() {
        let graph = Arc::new(IndexBenefitGraph::new(0, IndexSet::new()));
        let waiter = {
            let graph = Arc::clone(&graph);
            thread::spawn(move || {
                graph.wait_for_node(NodeId::ROOT, Duration::from_millis(5), &CancellationToken::new())
            })
        };
        thread::sleep(Duration::from_millis(20));
        graph.expand(NodeId::ROOT, leaf(1.0)).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), NodeWait::Expanded);
    }

    #[test]
    fn test_wait_reports_absent_and_aborted() {
        let graph = IndexBenefitGraph::new(4, IndexSet::new());
        graph.expand(NodeId::ROOT, leaf(1.0)).unwrap();
        graph.finish(ConstructionStats::default());
        let cancel = CancellationToken::new();
        assert_eq!(
            graph.wait_for_node(NodeId::new(1), Duration::from_millis(1), &cancel).unwrap(),
            NodeWait::Absent
        );

        let aborted = IndexBenefitGraph::new(5, IndexSet::new());
        aborted.abort();
        let err = aborted
            .wait_for_node(NodeId::ROOT, Duration::from_millis(1), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::ConstructionAborted { statement: 5 }));
    }

    #[test]
    fn test_cancelled_wait_is_interrupted() {
        let graph = IndexBenefitGraph::new(0, IndexSet::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = graph
            .wait_for_node(NodeId::ROOT, Duration::from_millis(1), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn test_snapshot_requires_complete_graph() {
        let graph = IndexBenefitGraph::new(0, IndexSet::new());
        assert!(graph.snapshot().is_err());
    }

    #[test]
    fn test_from_snapshot_rejects_bad_edge() {
        let snapshot = GraphSnapshot {
            statement: 0,
            candidates: IndexSet::from_ids([0, 1]),
            empty_cost: None,
            nodes: vec![
                NodeRecord {
                    id: NodeId::new(0),
                    config: IndexSet::from_ids([0, 1]),
                    cost: 5.0,
                    used: IndexSet::from_ids([0]),
                    children: vec![Edge {
                        index: 0,
                        child: NodeId::new(1),
                    }],
                },
                NodeRecord {
                    id: NodeId::new(1),
                    config: IndexSet::from_ids([0]),
                    cost: 9.0,
                    used: IndexSet::new(),
                    children: vec![],
                },
            ],
        };
        let err = IndexBenefitGraph::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, Error::GraphInconsistency(_)));
    }
}
