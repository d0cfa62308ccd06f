//! Workload descriptions and a table-driven what-if oracle.
//!
//! A [`PlanTableOracle`] models a statement by the plans an optimizer could
//! pick: each plan needs a set of indexes and has a fixed cost, and a
//! no-index plan with `base_cost` is always available. For a configuration
//! the oracle returns the cheapest plan whose indexes are all present (first
//! listed wins ties) and reports that plan's indexes as used. Removing an
//! index the chosen plan does not use never changes the answer, which is the
//! property covering-node reuse relies on.

use crate::ibg::{CostEstimate, IndexId, IndexSet, OracleFailure, WhatIfOracle};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub indexes: IndexSet,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTableOracle {
    pub base_cost: f64,
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// Configurations for which the what-if call fails.
    #[serde(default)]
    pub fail_on: Vec<IndexSet>,
}

impl PlanTableOracle {
    pub fn new(base_cost: f64) -> Self {
        Self {
            base_cost,
            plans: Vec::new(),
            fail_on: Vec::new(),
        }
    }

    pub fn with_plan<I: IntoIterator<Item = IndexId>>(mut self, indexes: I, cost: f64) -> Self {
        self.plans.push(Plan {
            indexes: IndexSet::from_ids(indexes),
            cost,
        });
        self
    }

    pub fn failing_on(mut self, config: IndexSet) -> Self {
        self.fail_on.push(config);
        self
    }

    fn validate(&self, statement: &str) -> Result<()> {
        let costs = std::iter::once(self.base_cost).chain(self.plans.iter().map(|p| p.cost));
        for cost in costs {
            if !cost.is_finite() || cost < 0.0 {
                return Err(Error::Config(format!(
                    "statement {} has invalid plan cost {}",
                    statement, cost
                )));
            }
        }
        Ok(())
    }
}

impl WhatIfOracle for PlanTableOracle {
    fn evaluate(&self, config: &IndexSet) -> std::result::Result<CostEstimate, OracleFailure> {
        if self.fail_on.iter().any(|f| f == config) {
            return Err(OracleFailure::new(config.clone(), "what-if call rejected"));
        }
        let mut best = CostEstimate::new(self.base_cost, IndexSet::new());
        for plan in &self.plans {
            if plan.cost < best.cost && plan.indexes.is_subset_of(config) {
                best = CostEstimate::new(plan.cost, plan.indexes.clone());
            }
        }
        Ok(best)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSpec {
    pub name: String,
    /// Overrides the workload-wide candidate set for this statement.
    #[serde(default)]
    pub candidates: Option<IndexSet>,
    #[serde(flatten)]
    pub oracle: PlanTableOracle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub candidates: IndexSet,
    pub statements: Vec<StatementSpec>,
}

impl Workload {
    pub fn from_json(json: &str) -> Result<Self> {
        let workload: Workload = serde_json::from_str(json)?;
        workload.validate()?;
        Ok(workload)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.statements.is_empty() {
            return Err(Error::Config("workload has no statements".to_string()));
        }
        for statement in &self.statements {
            statement.oracle.validate(&statement.name)?;
        }
        Ok(())
    }

    pub fn candidates_for(&self, statement: usize) -> IndexSet {
        self.statements
            .get(statement)
            .and_then(|s| s.candidates.clone())
            .unwrap_or_else(|| self.candidates.clone())
    }

    /// Universe for a session-wide interaction bank.
    pub fn all_candidates(&self) -> IndexSet {
        let mut all = self.candidates.clone();
        for statement in &self.statements {
            if let Some(own) = &statement.candidates {
                all.union_with(own);
            }
        }
        all
    }

    /// One `(candidates, oracle)` input per statement, in workload order.
    pub fn statement_inputs(&self) -> Vec<(IndexSet, PlanTableOracle)> {
        (0..self.statements.len())
            .map(|i| (self.candidates_for(i), self.statements[i].oracle.clone()))
            .collect()
    }
}
