#![allow(dead_code)]

use ibg_advisor::ibg::{CostEstimate, FnOracle, IndexId, IndexSet, OracleFailure};
use ibg_advisor::PlanTableOracle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

pub const EPSILON: f64 = 1e-9;

pub fn init_test_logging() {
    ibg_advisor::logging::try_init_test_logging();
}

/// cost({})=100, cost({0})=80, cost({1})=90, cost({0,1})=70.
pub fn four_node_oracle() -> PlanTableOracle {
    PlanTableOracle::new(100.0)
        .with_plan([0], 80.0)
        .with_plan([1], 90.0)
        .with_plan([0, 1], 70.0)
}

/// Joint savings exceed the sum of the individual savings.
pub fn interacting_oracle() -> PlanTableOracle {
    PlanTableOracle::new(100.0)
        .with_plan([0], 90.0)
        .with_plan([1], 95.0)
        .with_plan([0, 1], 60.0)
}

/// Savings are exactly additive.
pub fn additive_oracle() -> PlanTableOracle {
    PlanTableOracle::new(100.0)
        .with_plan([0], 90.0)
        .with_plan([1], 90.0)
        .with_plan([0, 1], 80.0)
}

pub fn all_subsets(candidates: &IndexSet) -> Vec<IndexSet> {
    let ids: Vec<IndexId> = candidates.iter().collect();
    (0u32..(1 << ids.len()))
        .map(|mask| {
            IndexSet::from_ids(
                ids.iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, &id)| id),
            )
        })
        .collect()
}

/// Plan table over `0..width` with up to `plans` plans, each using one to
/// three indexes and cheaper than the base plan.
pub fn random_plan_table(rng: &mut StdRng, width: u32, plans: usize) -> PlanTableOracle {
    let mut oracle = PlanTableOracle::new(1000.0);
    for _ in 0..plans {
        let size = rng.random_range(1..=3.min(width));
        let ids: Vec<IndexId> = (0..size).map(|_| rng.random_range(0..width)).collect();
        let cost = rng.random_range(10..1000) as f64;
        oracle = oracle.with_plan(ids, cost);
    }
    oracle
}

pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Wraps a plan table with a fixed per-call delay so construction and
/// analysis genuinely overlap.
pub fn slow(
    oracle: PlanTableOracle,
    delay: Duration,
) -> FnOracle<impl Fn(&IndexSet) -> Result<CostEstimate, OracleFailure> + Send> {
    use ibg_advisor::WhatIfOracle;
    FnOracle(move |config: &IndexSet| {
        std::thread::sleep(delay);
        oracle.evaluate(config)
    })
}
