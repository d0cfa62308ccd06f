//! Statement and workload drivers built on the graph primitives in
//! [`crate::ibg`].
//!
//! - `statement`: one graph, constructor and analyzer side by side
//! - `round_robin`: fair interleaving across many statements
//! - `runner`: whole-workload runs with per-statement failure isolation

pub mod round_robin;
pub mod runner;
pub mod statement;

pub use round_robin::{AnalysisOutcome, ConstructionEvent, RoundRobinAnalyzer, RoundRobinConstructor};
pub use runner::{StatementOutcome, WorkloadReport, WorkloadRunner};
pub use statement::{run_statement, CompletedStatement};
