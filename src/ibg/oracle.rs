//! What-if cost oracle interface.
//!
//! The oracle is the external cost estimator: given a configuration it returns
//! the estimated statement cost and the subset of indexes the chosen plan
//! actually uses. Calls are assumed to be far more expensive than any graph
//! bookkeeping, and must be idempotent for a fixed configuration within one
//! construction run.

use super::index_set::IndexSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Result of one what-if call.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    pub used: IndexSet,
}

impl CostEstimate {
    pub fn new(cost: f64, used: IndexSet) -> Self {
        Self { cost, used }
    }
}

/// A what-if call failed (lost connection, statement error, ...).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("what-if oracle failed for configuration {config}: {message}")]
pub struct OracleFailure {
    pub config: IndexSet,
    pub message: String,
}

impl OracleFailure {
    pub fn new(config: IndexSet, message: impl Into<String>) -> Self {
        Self {
            config,
            message: message.into(),
        }
    }
}

pub trait WhatIfOracle: Send {
    fn evaluate(&self, config: &IndexSet) -> Result<CostEstimate, OracleFailure>;
}

impl<O: WhatIfOracle + ?Sized> WhatIfOracle for Box<O> {
    fn evaluate(&self, config: &IndexSet) -> Result<CostEstimate, OracleFailure> {
        (**self).evaluate(config)
    }
}

/// Adapts a closure into an oracle.
pub struct FnOracle<F>(pub F);

impl<F> WhatIfOracle for FnOracle<F>
where
    F: Fn(&IndexSet) -> Result<CostEstimate, OracleFailure> + Send,
{
    fn evaluate(&self, config: &IndexSet) -> Result<CostEstimate, OracleFailure> {
        (self.0)(config)
    }
}

/// Wraps an oracle and counts every call made through it.
///
/// The counter is shared, so it stays readable after the oracle has been
/// moved into a construction task.
pub struct CountingOracle<O> {
    inner: O,
    calls: Arc<AtomicU64>,
}

impl<O: WhatIfOracle> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<O: WhatIfOracle> WhatIfOracle for CountingOracle<O> {
    fn evaluate(&self, config: &IndexSet) -> Result<CostEstimate, OracleFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.evaluate(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_oracle() {
        let oracle = CountingOracle::new(FnOracle(|config: &IndexSet| {
            Ok(CostEstimate::new(100.0 - config.len() as f64, config.clone()))
        }));
        let counter = oracle.counter();

        let est = oracle.evaluate(&IndexSet::from_ids([1, 2])).unwrap();
        assert_eq!(est.cost, 98.0);
        oracle.evaluate(&IndexSet::new()).unwrap();

        assert_eq!(oracle.calls(), 2);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_boxed_oracle_failure() {
        let oracle: Box<dyn WhatIfOracle> = Box::new(FnOracle(|config: &IndexSet| {
            Err(OracleFailure::new(config.clone(), "connection reset"))
        }));
        let err = oracle.evaluate(&IndexSet::from_ids([4])).unwrap_err();
        assert_eq!(err.config, IndexSet::from_ids([4]));
        assert!(err.to_string().contains("connection reset"));
    }
}
