use crate::config::AdvisorConfig;
use crate::ibg::{
    fix, AnalyzerStats, CancellationToken, ConstructionStats, IbgAnalyzer, IbgConstructor,
    IndexBenefitGraph, IndexSet, InteractionBank, RepairReport, WhatIfOracle,
};
use crate::{Error, Result};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// A statement whose graph was built, analyzed and (optionally) repaired.
#[derive(Debug)]
pub struct CompletedStatement {
    pub statement: usize,
    pub graph: IndexBenefitGraph,
    pub construction: ConstructionStats,
    pub analysis: AnalyzerStats,
    pub repair: Option<RepairReport>,
}

/// Builds one statement's graph and analyzes it into `bank`.
///
/// With `concurrent_analysis` the constructor runs on its own thread while
/// the analyzer follows it on the calling thread; otherwise construction
/// completes first. Both orders leave the same contents in `bank`.
pub fn run_statement<O: WhatIfOracle>(
    statement: usize,
    candidates: IndexSet,
    oracle: O,
    bank: &InteractionBank,
    config: &AdvisorConfig,
    cancel: &CancellationToken,
) -> Result<CompletedStatement> {
    let constructor = IbgConstructor::new(statement, candidates, oracle)
        .with_covering(config.use_covering_nodes)
        .with_cancellation(cancel.clone());
    let graph = Arc::clone(constructor.graph());
    let mut analyzer = IbgAnalyzer::new(Arc::clone(&graph))
        .with_wait_timeout(config.wait_timeout())
        .with_cancellation(cancel.clone());

    let (built, analyzed) = if config.concurrent_analysis {
        thread::scope(|scope| {
            let construction = thread::Builder::new()
                .name(format!("ibg-construct-{}", statement))
                .spawn_scoped(scope, move || constructor.run().map(|_| ()))?;
            let analyzed = analyzer.analyze(bank);
            let built = construction.join().map_err(|_| {
                Error::GraphInconsistency(format!(
                    "construction thread for statement {} panicked",
                    statement
                ))
            })?;
            Ok::<_, Error>((built, analyzed))
        })?
    } else {
        let built = constructor.run().map(|_| ());
        let analyzed = match &built {
            Ok(()) => analyzer.analyze(bank),
            Err(_) => Err(Error::ConstructionAborted { statement }),
        };
        (built, analyzed)
    };

    built?;
    let analysis = analyzed?;
    drop(analyzer);

    let mut graph = Arc::try_unwrap(graph).map_err(|_| {
        Error::GraphInconsistency(format!("graph of statement {} is still shared", statement))
    })?;
    finish_statement(statement, &mut graph, analysis, config)
        .map(|(construction, analysis, repair)| CompletedStatement {
            statement,
            graph,
            construction,
            analysis,
            repair,
        })
}

/// Post-analysis bookkeeping shared with the workload runner.
pub(crate) fn finish_statement(
    statement: usize,
    graph: &mut IndexBenefitGraph,
    analysis: AnalyzerStats,
    config: &AdvisorConfig,
) -> Result<(ConstructionStats, AnalyzerStats, Option<RepairReport>)> {
    let construction = graph.stats().cloned().unwrap_or_default();
    let repair = if config.enforce_monotonicity {
        Some(fix(graph)?)
    } else {
        None
    };
    debug!(
        statement,
        nodes = construction.node_count,
        oracle_calls = construction.oracle_calls,
        pairs = analysis.pairs_evaluated,
        "statement finished"
    );
    Ok((construction, analysis, repair))
}
