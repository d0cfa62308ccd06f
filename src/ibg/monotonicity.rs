//! Repair pass restoring `C1 ⊆ C2 ⇒ cost(C1) ≥ cost(C2)` over expanded nodes.
//!
//! Covering-node reuse and imperfect optimizers can leave a node cheaper than
//! one of its supersets. For every node `N`, the pass walks the graph
//! breadth-first from the root and raises any node whose configuration is a
//! strict subset of `N.config` to at least `N.cost`. The empty configuration
//! is a subset of everything and its cost is raised the same way.

use super::graph::IndexBenefitGraph;
use super::node::{Node, NodeId};
use crate::{Error, Result};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub nodes_visited: usize,
    pub costs_raised: usize,
    pub empty_cost_raised: bool,
}

/// Runs the repair pass. Requires exclusive access, so it can only run once
/// construction and any concurrent analysis have released the graph.
pub fn fix(graph: &mut IndexBenefitGraph) -> Result<RepairReport> {
    if !graph.is_complete() {
        return Err(Error::GraphInconsistency(format!(
            "monotonicity repair on incomplete graph for statement {}",
            graph.statement()
        )));
    }
    let statement = graph.statement();
    let nodes = graph.nodes_mut();
    let order = breadth_first(nodes);
    let mut report = RepairReport {
        nodes_visited: order.len(),
        ..RepairReport::default()
    };

    let mut max_cost = f64::NEG_INFINITY;
    for &outer in &order {
        let (config, cost) = {
            let node = &nodes[outer.index()];
            (node.config().clone(), expanded_cost(node)?)
        };
        max_cost = max_cost.max(cost);

        for &inner in &order {
            let node = &mut nodes[inner.index()];
            if inner == outer || !node.config().is_subset_of(&config) {
                continue;
            }
            let Some(expansion) = node.expansion_mut() else {
                continue;
            };
            if expansion.cost < cost {
                expansion.cost = cost;
                report.costs_raised += 1;
            }
        }
    }

    if let Some(empty_cost) = graph.empty_cost_mut() {
        if *empty_cost < max_cost {
            *empty_cost = max_cost;
            report.empty_cost_raised = true;
        }
    }

    debug!(
        statement,
        visited = report.nodes_visited,
        raised = report.costs_raised,
        empty_raised = report.empty_cost_raised,
        "monotonicity repair complete"
    );
    Ok(report)
}

fn expanded_cost(node: &Node) -> Result<f64> {
    node.cost()
        .ok_or_else(|| Error::GraphInconsistency(format!("node {} unexpanded", node.id())))
}

fn breadth_first(nodes: &[Node]) -> Vec<NodeId> {
    let mut seen = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue = VecDeque::from([NodeId::ROOT]);
    if let Some(root) = seen.first_mut() {
        *root = true;
    }
    while let Some(id) = queue.pop_front() {
        order.push(id);
        let Some(expansion) = nodes[id.index()].expansion() else {
            continue;
        };
        for edge in expansion.children() {
            if !seen[edge.child.index()] {
                seen[edge.child.index()] = true;
                queue.push_back(edge.child);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibg::constructor::build;
    use crate::ibg::index_set::IndexSet;
    use crate::ibg::oracle::{CostEstimate, FnOracle, OracleFailure};
    use crate::workload::PlanTableOracle;

    /// Costs that ignore the subset order: {0} is cheaper than {0,1}.
    fn skewed(config: &IndexSet) -> std::result::Result<CostEstimate, OracleFailure> {
        let cost = match (config.contains(0), config.contains(1)) {
            (true, true) => 70.0,
            (true, false) => 40.0,
            (false, true) => 90.0,
            (false, false) => 60.0,
        };
        Ok(CostEstimate::new(cost, config.clone()))
    }

    #[test]
    fn test_raises_subset_costs() {
        let mut graph = build(0, IndexSet::from_ids([0, 1]), FnOracle(skewed), true).unwrap();
        let report = fix(&mut graph).unwrap();
        assert!(report.costs_raised > 0);
        assert_eq!(report.nodes_visited, 4);

        let view = graph.read();
        for n1 in view.iter() {
            for n2 in view.iter() {
                if n1.config().is_subset_of(n2.config()) {
                    assert!(n1.cost().unwrap() >= n2.cost().unwrap());
                }
            }
        }
        drop(view);

        assert_eq!(graph.cost_of(&IndexSet::from_ids([0])).unwrap(), 70.0);
        assert_eq!(graph.cost_of(&IndexSet::from_ids([1])).unwrap(), 90.0);
        assert_eq!(graph.empty_cost(), Some(90.0));
    }

    #[test]
    fn test_monotone_graph_is_untouched() {
        let oracle = PlanTableOracle::new(100.0).with_plan([0], 80.0).with_plan([1], 90.0);
        let mut graph = build(0, IndexSet::from_ids([0, 1]), oracle, true).unwrap();
        let before = graph.snapshot().unwrap();
        let report = fix(&mut graph).unwrap();
        assert_eq!(report.costs_raised, 0);
        assert!(!report.empty_cost_raised);
        assert_eq!(graph.snapshot().unwrap(), before);
    }
}
