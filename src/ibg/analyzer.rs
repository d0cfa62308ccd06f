//! Pairwise index-interaction analysis over a (possibly still growing) graph.
//!
//! Nodes are visited strictly in creation order. For a node with
//! configuration `M` and every pair `a, b` of indexes used so far but absent
//! from `M`, the analyzer resolves `M ∪ {a}`, `M ∪ {b}` and `M ∪ {a, b}`
//! through one multi-target covering search and records
//!
//! ```text
//! doi(a, b) = |Y - Ya - Yb + Yab| / Yab      (0 when Yab == 0)
//! ```
//!
//! A node's results are only committed when the search never touched an
//! unexpanded relevant node, so running alongside construction yields the
//! same bank as running after it.

use super::cancel::CancellationToken;
use super::covering::CoveringNodeFinder;
use super::graph::{IndexBenefitGraph, NodeWait};
use super::index_set::{IndexId, IndexSet};
use super::interaction::InteractionBank;
use super::node::NodeId;
use crate::config::AdvisorConfig;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Outcome of one analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    /// The node was analyzed and its interactions recorded.
    Progressed(NodeId),
    /// Progress needs this node to be expanded first.
    Blocked(NodeId),
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerStats {
    pub nodes_analyzed: usize,
    pub pairs_evaluated: u64,
    pub blocked: u64,
}

enum NodeAnalysis {
    Complete,
    Pending(NodeId),
}

pub struct IbgAnalyzer {
    graph: Arc<IndexBenefitGraph>,
    next: usize,
    used: IndexSet,
    finder: CoveringNodeFinder,
    wait_timeout: Duration,
    cancel: CancellationToken,
    stats: AnalyzerStats,
    done: bool,
}

impl IbgAnalyzer {
    pub fn new(graph: Arc<IndexBenefitGraph>) -> Self {
        Self {
            graph,
            next: 0,
            used: IndexSet::new(),
            finder: CoveringNodeFinder::new(),
            wait_timeout: AdvisorConfig::default().wait_timeout(),
            cancel: CancellationToken::new(),
            stats: AnalyzerStats::default(),
            done: false,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn graph(&self) -> &Arc<IndexBenefitGraph> {
        &self.graph
    }

    pub fn stats(&self) -> &AnalyzerStats {
        &self.stats
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Analyzes the next node in creation order.
    ///
    /// With `wait == false` the step never blocks and reports
    /// [`AnalysisStep::Blocked`] instead. With `wait == true` it waits on the
    /// graph's expansion signal until the node can be analyzed.
    pub fn step(&mut self, bank: &InteractionBank, wait: bool) -> Result<AnalysisStep> {
        if self.done {
            return Ok(AnalysisStep::Done);
        }
        let id = NodeId::new(self.next);

        loop {
            let status = if wait {
                Some(self.graph.wait_for_node(id, self.wait_timeout, &self.cancel)?)
            } else {
                self.graph.probe_node(id)?
            };
            match status {
                None => {
                    self.stats.blocked += 1;
                    return Ok(AnalysisStep::Blocked(id));
                }
                Some(NodeWait::Absent) => {
                    self.done = true;
                    debug!(
                        statement = self.graph.statement(),
                        nodes = self.stats.nodes_analyzed,
                        pairs = self.stats.pairs_evaluated,
                        "analysis complete"
                    );
                    return Ok(AnalysisStep::Done);
                }
                Some(NodeWait::Expanded) => {}
            }

            match self.analyze_node(id, bank)? {
                NodeAnalysis::Complete => {
                    self.next += 1;
                    self.stats.nodes_analyzed += 1;
                    return Ok(AnalysisStep::Progressed(id));
                }
                NodeAnalysis::Pending(pending) => {
                    self.stats.blocked += 1;
                    if !wait {
                        return Ok(AnalysisStep::Blocked(pending));
                    }
                    trace!(
                        statement = self.graph.statement(),
                        node = id.index(),
                        pending = pending.index(),
                        "analysis waiting on expansion"
                    );
                    self.graph.wait_for_node(pending, self.wait_timeout, &self.cancel)?;
                }
            }
        }
    }

    /// Analyzes every node, blocking as needed, until construction ends.
    pub fn analyze(&mut self, bank: &InteractionBank) -> Result<AnalyzerStats> {
        while self.step(bank, true)? != AnalysisStep::Done {}
        Ok(self.stats.clone())
    }

    fn analyze_node(&mut self, id: NodeId, bank: &InteractionBank) -> Result<NodeAnalysis> {
        let view = self.graph.read();
        let node = view.node(id);
        let expansion = node.expansion().ok_or_else(|| {
            Error::GraphInconsistency(format!("analysis reached unexpanded node {}", id))
        })?;
        let used = self.used.union(expansion.used());
        let config = node.config();
        let free: Vec<IndexId> = used.iter().filter(|&i| !config.contains(i)).collect();

        if free.len() < 2 {
            drop(view);
            self.used = used;
            return Ok(NodeAnalysis::Complete);
        }

        // Targets: one per free index, then one per free pair in (i, j) order.
        let mut targets: Vec<IndexSet> = free.iter().map(|&a| config.with(a)).collect();
        let mut pairs = Vec::with_capacity(free.len() * (free.len() - 1) / 2);
        for i in 0..free.len() {
            for j in (i + 1)..free.len() {
                pairs.push((i, j));
                targets.push(targets[i].with(free[j]));
            }
        }

        let report = self.finder.find_many(&view, NodeId::ROOT, &targets);
        if let Some(pending) = report.pending {
            return Ok(NodeAnalysis::Pending(pending));
        }

        let mut costs = Vec::with_capacity(targets.len());
        for (target, found) in targets.iter().zip(report.found.iter()) {
            let cost = found
                .and_then(|cover| view.node(cover).cost())
                .ok_or_else(|| {
                    Error::GraphInconsistency(format!(
                        "no covering node for {} in statement {}",
                        target,
                        self.graph.statement()
                    ))
                })?;
            costs.push(cost);
        }

        let y = expansion.cost();
        let singles = free.len();
        let mut levels = Vec::with_capacity(pairs.len());
        for (k, &(i, j)) in pairs.iter().enumerate() {
            let yab = costs[singles + k];
            let doi = degree_of_interaction(y, costs[i], costs[j], yab);
            levels.push((free[i], free[j], doi));
        }
        drop(view);

        for (a, b, doi) in &levels {
            bank.record(*a, *b, *doi);
        }
        self.stats.pairs_evaluated += levels.len() as u64;
        self.used = used;
        trace!(
            statement = self.graph.statement(),
            node = id.index(),
            pairs = levels.len(),
            "node analyzed"
        );
        Ok(NodeAnalysis::Complete)
    }
}

/// `|Y - Ya - Yb + Yab| / Yab`, defined as 0 when `Yab` is 0.
pub fn degree_of_interaction(y: f64, ya: f64, yb: f64, yab: f64) -> f64 {
    if yab == 0.0 {
        return 0.0;
    }
    (y - ya - yb + yab).abs() / yab
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibg::constructor::{build, BuildStep, IbgConstructor};
    use crate::workload::PlanTableOracle;

    fn pair_oracle(c0: f64, c1: f64, c01: f64) -> PlanTableOracle {
        PlanTableOracle::new(100.0)
            .with_plan([0], c0)
            .with_plan([1], c1)
            .with_plan([0, 1], c01)
    }

    fn analyze_complete(oracle: PlanTableOracle, candidates: IndexSet) -> InteractionBank {
        let graph = Arc::new(build(0, candidates.clone(), oracle, true).unwrap());
        let bank = InteractionBank::new(candidates);
        IbgAnalyzer::new(graph).analyze(&bank).unwrap();
        bank
    }

    #[test]
    fn test_degree_of_interaction_guard() {
        assert_eq!(degree_of_interaction(10.0, 5.0, 5.0, 0.0), 0.0);
        assert!((degree_of_interaction(100.0, 90.0, 95.0, 60.0) - 25.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_interacting_pair() {
        let bank = analyze_complete(pair_oracle(90.0, 95.0, 60.0), IndexSet::from_ids([0, 1]));
        assert!((bank.interaction_level(0, 1) - 0.4167).abs() < 1e-3);
    }

    #[test]
    fn test_additive_pair_has_no_interaction() {
        let bank = analyze_complete(pair_oracle(90.0, 90.0, 80.0), IndexSet::from_ids([0, 1]));
        assert_eq!(bank.interaction_level(0, 1), 0.0);
    }

    #[test]
    fn test_non_blocking_step_reports_blocked() {
        let candidates = IndexSet::from_ids([0, 1]);
        let mut constructor = IbgConstructor::new(0, candidates.clone(), pair_oracle(90.0, 95.0, 60.0));
        let bank = InteractionBank::new(candidates);
        let mut analyzer = IbgAnalyzer::new(Arc::clone(constructor.graph()));

        assert_eq!(analyzer.step(&bank, false).unwrap(), AnalysisStep::Blocked(NodeId::ROOT));

        while constructor.step().unwrap() != BuildStep::Finished {
            analyzer.step(&bank, false).unwrap();
        }
        while analyzer.step(&bank, false).unwrap() != AnalysisStep::Done {}

        assert_eq!(analyzer.stats().nodes_analyzed, 4);
        assert!(analyzer.stats().blocked >= 1);
        assert!((bank.interaction_level(0, 1) - 25.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_aborted_graph_ends_analysis_with_error() {
        let candidates = IndexSet::from_ids([0, 1]);
        let oracle = pair_oracle(90.0, 95.0, 60.0).failing_on(candidates.clone());
        let mut constructor = IbgConstructor::new(7, candidates.clone(), oracle);
        let bank = InteractionBank::new(candidates);
        let mut analyzer = IbgAnalyzer::new(Arc::clone(constructor.graph()));

        assert!(constructor.step().is_err());
        let err = analyzer.step(&bank, true).unwrap_err();
        assert!(matches!(err, Error::ConstructionAborted { statement: 7 }));
    }

    #[test]
    fn test_default_wait_timeout_follows_config() {
        let graph = Arc::new(IndexBenefitGraph::new(0, IndexSet::from_ids([0])));
        let analyzer = IbgAnalyzer::new(Arc::clone(&graph));
        assert_eq!(analyzer.wait_timeout(), AdvisorConfig::default().wait_timeout());

        let tuned = IbgAnalyzer::new(graph).with_wait_timeout(Duration::from_millis(5));
        assert_eq!(tuned.wait_timeout(), Duration::from_millis(5));
    }
}
