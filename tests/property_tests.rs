use ibg_advisor::ibg::{
    build, fix, CostEstimate, CountingOracle, FnOracle, IndexId, IndexSet, OracleFailure,
};
use ibg_advisor::PlanTableOracle;
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

mod common;
use common::all_subsets;

fn plan_table(width: u32) -> impl Strategy<Value = PlanTableOracle> {
    let plan = (prop_vec(0..width, 1..=3), 1u32..1000);
    prop_vec(plan, 0..8).prop_map(|plans| {
        plans
            .into_iter()
            .fold(PlanTableOracle::new(1000.0), |oracle, (ids, cost)| {
                oracle.with_plan(ids, cost as f64)
            })
    })
}

/// Every index is used, so every subset becomes a node; costs are arbitrary.
fn lattice_oracle(
    width: u32,
    costs: Vec<u32>,
) -> FnOracle<impl Fn(&IndexSet) -> Result<CostEstimate, OracleFailure> + Send> {
    FnOracle(move |config: &IndexSet| {
        let mask: usize = config.iter().map(|id: IndexId| 1usize << id).sum();
        debug_assert!(config.iter().all(|id| id < width));
        Ok(CostEstimate::new(costs[mask] as f64, config.clone()))
    })
}

// Property: covering reuse never costs extra oracle calls or changes the graph
proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_covering_never_adds_oracle_calls(width in 1u32..6, seed_plans in plan_table(5)) {
        let candidates = IndexSet::from_ids(0..width);

        let with = CountingOracle::new(seed_plans.clone());
        let with_calls = with.counter();
        let covered = build(0, candidates.clone(), with, true).unwrap();

        let without = CountingOracle::new(seed_plans);
        let without_calls = without.counter();
        let plain = build(0, candidates, without, false).unwrap();

        let with_calls = with_calls.load(std::sync::atomic::Ordering::Relaxed);
        let without_calls = without_calls.load(std::sync::atomic::Ordering::Relaxed);
        prop_assert!(with_calls <= without_calls);
        prop_assert_eq!(covered.snapshot().unwrap(), plain.snapshot().unwrap());

        let shortcuts = covered.stats().unwrap().covered_nodes;
        prop_assert_eq!(with_calls + shortcuts, without_calls);
        if shortcuts > 0 {
            prop_assert!(with_calls < without_calls);
        }
    }
}

// Property: whatever the finder returns really covers the query
proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_covering_soundness(oracle in plan_table(4), query in prop_vec(0u32..4, 0..4)) {
        let candidates = IndexSet::from_ids(0..4);
        let graph = build(0, candidates, oracle.clone(), true).unwrap();
        let query = IndexSet::from_ids(query);

        let found = graph.find_covering(&query);
        prop_assert!(found.is_some());
        let view = graph.read();
        let node = view.node(found.unwrap());
        prop_assert!(node.config().is_superset_of(&query));
        prop_assert!(node.expansion().unwrap().used().is_subset_of(&query));
        drop(view);

        use ibg_advisor::WhatIfOracle;
        if !query.is_empty() {
            prop_assert_eq!(graph.cost_of(&query).unwrap(), oracle.evaluate(&query).unwrap().cost);
        }
    }
}

// Property: plan-table graphs are monotone, and the repair pass leaves them alone
proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_plan_table_graphs_are_monotone(oracle in plan_table(4)) {
        let candidates = IndexSet::from_ids(0..4);
        let mut graph = build(0, candidates.clone(), oracle, true).unwrap();
        let report = fix(&mut graph).unwrap();
        prop_assert_eq!(report.costs_raised, 0);
        prop_assert!(!report.empty_cost_raised);

        let subsets = all_subsets(&candidates);
        for small in &subsets {
            for large in subsets.iter().filter(|s| small.is_subset_of(s)) {
                prop_assert!(graph.cost_of(small).unwrap() >= graph.cost_of(large).unwrap());
            }
        }
    }
}

// Property: the repair pass restores the monotonicity law on any cost table
proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_fix_restores_monotonicity(costs in prop_vec(1u32..500, 16)) {
        let width = 4;
        let candidates = IndexSet::from_ids(0..width);
        let mut graph = build(0, candidates.clone(), lattice_oracle(width, costs), true).unwrap();
        prop_assert_eq!(graph.node_count(), 16);

        fix(&mut graph).unwrap();

        let subsets = all_subsets(&candidates);
        for small in &subsets {
            for large in subsets.iter().filter(|s| small.is_subset_of(s)) {
                let (a, b) = (graph.cost_of(small).unwrap(), graph.cost_of(large).unwrap());
                prop_assert!(a >= b, "cost({}) = {} < cost({}) = {}", small, a, large, b);
            }
        }
    }
}
