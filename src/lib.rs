//! Index interaction analysis for physical database tuning.
//!
//! For each workload statement an [`IndexBenefitGraph`] memoizes what-if
//! optimizer costs over index configurations, so the cost of any subset of
//! the statement's candidate indexes is known without further optimizer
//! calls. Graphs are analyzed, possibly while still under construction, for
//! pairwise degrees of interaction which accumulate in a session-wide
//! [`InteractionBank`] and feed a stable partition of the candidates.

pub mod config;
pub mod error;
pub mod ibg;
pub mod logging;
pub mod pipeline;
pub mod workload;

pub use config::{AdvisorConfig, AdvisorPreset};
pub use error::{Error, Result};
pub use ibg::{
    build, CancellationToken, IbgAnalyzer, IbgConstructor, IndexBenefitGraph, IndexId, IndexSet,
    InteractionBank, WhatIfOracle,
};
pub use logging::init_logging;
pub use pipeline::{run_statement, WorkloadReport, WorkloadRunner};
pub use workload::{PlanTableOracle, Workload};
