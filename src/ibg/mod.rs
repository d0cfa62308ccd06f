//! Index Benefit Graph
//!
//! This module implements the memoized what-if cost graph used to reason
//! about index configurations without building indexes:
//! - `index_set`: bit-indexed configurations
//! - `graph` / `node`: the node arena and its read/wait protocol
//! - `constructor`: lazy expansion driven by the what-if oracle
//! - `covering`: covering-node lookups that avoid oracle calls
//! - `analyzer` / `interaction`: pairwise degree-of-interaction bounds
//! - `monotonicity`: the post-construction cost repair pass

pub mod analyzer;
pub mod cancel;
pub mod constructor;
pub mod covering;
pub mod graph;
pub mod index_set;
pub mod interaction;
pub mod monotonicity;
pub mod node;
pub mod oracle;

pub use analyzer::{degree_of_interaction, AnalysisStep, AnalyzerStats, IbgAnalyzer};
pub use cancel::CancellationToken;
pub use constructor::{build, BuildStep, ConstructionStats, IbgConstructor};
pub use covering::{CoverageReport, CoveringNodeFinder, Descent};
pub use graph::{BuildPhase, GraphSnapshot, GraphView, IndexBenefitGraph, NodeRecord, NodeWait};
pub use index_set::{IndexId, IndexSet};
pub use interaction::{IndexPair, InteractionBank};
pub use monotonicity::{fix, RepairReport};
pub use node::{Edge, Expansion, Node, NodeId};
pub use oracle::{CostEstimate, CountingOracle, FnOracle, OracleFailure, WhatIfOracle};
