//! Lazy construction of an index benefit graph.
//!
//! Nodes are expanded in FIFO order, which is also creation order. Before a
//! what-if call, the constructor descends from the root looking for an
//! already-expanded node that covers the pending configuration; a hit reuses
//! that node's cost and used set and skips the oracle entirely.
//!
//! Construction is exposed one expansion at a time through
//! [`IbgConstructor::step`] so that a scheduler can interleave many graphs.

use super::cancel::CancellationToken;
use super::covering::{self, Descent};
use super::graph::IndexBenefitGraph;
use super::index_set::IndexSet;
use super::node::{Edge, Expansion, NodeId};
use super::oracle::{CostEstimate, OracleFailure, WhatIfOracle};
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructionStats {
    pub node_count: usize,
    pub oracle_calls: u64,
    /// Nodes whose cost was certified by a covering node.
    pub covered_nodes: u64,
    pub elapsed: Duration,
}

/// Progress reported by one construction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Expanded(NodeId),
    Finished,
}

pub struct IbgConstructor<O> {
    graph: Arc<IndexBenefitGraph>,
    oracle: O,
    queue: VecDeque<NodeId>,
    by_config: HashMap<IndexSet, NodeId>,
    use_covering: bool,
    cancel: CancellationToken,
    stats: ConstructionStats,
    done: bool,
}

impl<O: WhatIfOracle> IbgConstructor<O> {
    pub fn new(statement: usize, candidates: IndexSet, oracle: O) -> Self {
        let graph = Arc::new(IndexBenefitGraph::new(statement, candidates.clone()));
        let mut by_config = HashMap::new();
        by_config.insert(candidates, NodeId::ROOT);
        Self {
            graph,
            oracle,
            queue: VecDeque::from([NodeId::ROOT]),
            by_config,
            use_covering: true,
            cancel: CancellationToken::new(),
            stats: ConstructionStats::default(),
            done: false,
        }
    }

    pub fn with_covering(mut self, enabled: bool) -> Self {
        self.use_covering = enabled;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn graph(&self) -> &Arc<IndexBenefitGraph> {
        &self.graph
    }

    pub fn stats(&self) -> &ConstructionStats {
        &self.stats
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Performs one node expansion, or finalizes the graph once the queue
    /// is drained. Any error aborts this graph and wakes its readers.
    pub fn step(&mut self) -> Result<BuildStep> {
        if self.done {
            return Ok(BuildStep::Finished);
        }
        let started = Instant::now();
        let result = self.step_inner();
        self.stats.elapsed += started.elapsed();

        match result {
            Ok(BuildStep::Finished) => {
                self.done = true;
                Ok(BuildStep::Finished)
            }
            Ok(step) => Ok(step),
            Err(e) => {
                self.done = true;
                self.graph.abort();
                debug!(
                    statement = self.graph.statement(),
                    error = %e,
                    "graph construction aborted"
                );
                Err(e)
            }
        }
    }

    /// Runs construction to completion and hands back the shared graph.
    pub fn run(mut self) -> Result<Arc<IndexBenefitGraph>> {
        while self.step()? != BuildStep::Finished {}
        Ok(self.graph)
    }

    fn step_inner(&mut self) -> Result<BuildStep> {
        if self.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        match self.queue.pop_front() {
            Some(id) => {
                self.expand_node(id)?;
                Ok(BuildStep::Expanded(id))
            }
            None => {
                self.finalize()?;
                Ok(BuildStep::Finished)
            }
        }
    }

    fn expand_node(&mut self, id: NodeId) -> Result<()> {
        let config = self.graph.read().node(id).config().clone();

        let estimate = match self.covering_estimate(&config) {
            Some((cover, estimate)) => {
                self.stats.covered_nodes += 1;
                trace!(
                    statement = self.graph.statement(),
                    node = id.index(),
                    cover = cover.index(),
                    "configuration certified by covering node"
                );
                estimate
            }
            None => self.evaluate(&config)?,
        };

        if !estimate.used.is_subset_of(&config) {
            return Err(Error::GraphInconsistency(format!(
                "used set {} of node {} is not within its configuration {}",
                estimate.used, id, config
            )));
        }

        let mut children = Vec::with_capacity(estimate.used.len());
        for index in estimate.used.iter() {
            let child_config = config.without(index);
            let child = match self.by_config.get(&child_config) {
                Some(&existing) => existing,
                None => {
                    let created = self.graph.add_node(child_config.clone());
                    self.by_config.insert(child_config, created);
                    self.queue.push_back(created);
                    created
                }
            };
            children.push(Edge { index, child });
        }

        trace!(
            statement = self.graph.statement(),
            node = id.index(),
            cost = estimate.cost,
            children = children.len(),
            "node expanded"
        );
        self.graph.expand(
            id,
            Expansion {
                cost: estimate.cost,
                used: estimate.used,
                children,
            },
        )
    }

    fn covering_estimate(&self, config: &IndexSet) -> Option<(NodeId, CostEstimate)> {
        if !self.use_covering {
            return None;
        }
        let view = self.graph.read();
        match covering::descend(&view, NodeId::ROOT, config) {
            Descent::Covered(cover) => {
                let expansion = view.node(cover).expansion()?;
                Some((cover, CostEstimate::new(expansion.cost(), expansion.used().clone())))
            }
            Descent::Unexpanded(_) => None,
        }
    }

    fn evaluate(&mut self, config: &IndexSet) -> Result<CostEstimate> {
        self.stats.oracle_calls += 1;
        trace!(
            statement = self.graph.statement(),
            config = %config,
            "what-if call"
        );
        let estimate = self.oracle.evaluate(config)?;
        if !estimate.cost.is_finite() {
            return Err(OracleFailure::new(
                config.clone(),
                format!("non-finite cost {}", estimate.cost),
            )
            .into());
        }
        Ok(estimate)
    }

    fn finalize(&mut self) -> Result<()> {
        let empty = IndexSet::new();
        let known = self
            .by_config
            .get(&empty)
            .and_then(|&id| self.graph.read().node(id).cost());
        let empty_cost = match known {
            Some(cost) => cost,
            None => self.evaluate(&empty)?.cost,
        };
        self.graph.set_empty_cost(empty_cost)?;

        self.stats.node_count = self.graph.node_count();
        debug!(
            statement = self.graph.statement(),
            nodes = self.stats.node_count,
            oracle_calls = self.stats.oracle_calls,
            covered = self.stats.covered_nodes,
            elapsed_us = self.stats.elapsed.as_micros() as u64,
            "graph construction complete"
        );
        self.graph.finish(self.stats.clone());
        Ok(())
    }
}

/// Builds the complete graph of one statement.
pub fn build<O: WhatIfOracle>(
    statement: usize,
    candidates: IndexSet,
    oracle: O,
    use_covering: bool,
) -> Result<IndexBenefitGraph> {
    let graph = IbgConstructor::new(statement, candidates, oracle)
        .with_covering(use_covering)
        .run()?;
    Arc::try_unwrap(graph)
        .map_err(|_| Error::GraphInconsistency("constructed graph is still shared".to_string()))
}
