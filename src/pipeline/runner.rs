//! Multi-statement runner: round-robin construction on a worker thread,
//! round-robin analysis on the calling thread.
//!
//! Each statement analyzes into its own staging bank, merged into the
//! session bank only once the statement completes. A failed statement's
//! graph and partial interactions are discarded as a unit and reported as
//! unrecommendable; the rest of the workload proceeds normally.

use super::round_robin::{AnalysisOutcome, ConstructionEvent, RoundRobinAnalyzer, RoundRobinConstructor};
use super::statement::{finish_statement, CompletedStatement};
use crate::config::AdvisorConfig;
use crate::ibg::{CancellationToken, IbgAnalyzer, IbgConstructor, IndexSet, InteractionBank, WhatIfOracle};
use crate::workload::Workload;
use crate::{Error, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
pub enum StatementOutcome {
    Completed(CompletedStatement),
    Failed { statement: usize, error: Error },
}

impl StatementOutcome {
    pub fn statement(&self) -> usize {
        match self {
            StatementOutcome::Completed(done) => done.statement,
            StatementOutcome::Failed { statement, .. } => *statement,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StatementOutcome::Completed(_))
    }
}

#[derive(Debug)]
pub struct WorkloadReport {
    /// One outcome per statement, in workload order.
    pub outcomes: Vec<StatementOutcome>,
    pub elapsed: Duration,
}

impl WorkloadReport {
    pub fn completed(&self) -> impl Iterator<Item = &CompletedStatement> {
        self.outcomes.iter().filter_map(|o| match o {
            StatementOutcome::Completed(done) => Some(done),
            StatementOutcome::Failed { .. } => None,
        })
    }

    /// Statements that cannot be recommended for in this run.
    pub fn unrecommendable(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_completed())
            .map(StatementOutcome::statement)
            .collect()
    }
}

pub struct WorkloadRunner {
    config: AdvisorConfig,
    cancel: CancellationToken,
}

impl WorkloadRunner {
    pub fn new(config: AdvisorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn run_workload(&self, workload: &Workload, bank: &InteractionBank) -> Result<WorkloadReport> {
        self.run(workload.statement_inputs(), bank)
    }

    /// Builds and analyzes one graph per `(candidates, oracle)` input.
    pub fn run<O: WhatIfOracle>(
        &self,
        inputs: Vec<(IndexSet, O)>,
        bank: &InteractionBank,
    ) -> Result<WorkloadReport> {
        self.config.validate()?;
        let started = Instant::now();
        let count = inputs.len();

        let mut construction = RoundRobinConstructor::new();
        let mut analysis = RoundRobinAnalyzer::new();
        let mut graphs = Vec::with_capacity(count);
        let mut staging = Vec::with_capacity(count);

        for (statement, (candidates, oracle)) in inputs.into_iter().enumerate() {
            let stage = Arc::new(InteractionBank::new(candidates.clone()));
            let constructor = IbgConstructor::new(statement, candidates, oracle)
                .with_covering(self.config.use_covering_nodes)
                .with_cancellation(self.cancel.clone());
            let analyzer = IbgAnalyzer::new(Arc::clone(constructor.graph()))
                .with_wait_timeout(self.config.wait_timeout())
                .with_cancellation(self.cancel.clone());

            graphs.push(Arc::clone(constructor.graph()));
            staging.push(Arc::clone(&stage));
            analysis.add(analyzer, stage);
            construction.add(constructor);
        }

        let (built, analyzed) = if self.config.concurrent_analysis {
            thread::scope(|scope| {
                let driver = thread::Builder::new()
                    .name("ibg-construct".to_string())
                    .spawn_scoped(scope, move || construction.run())?;
                let analyzed = analysis.run();
                let built = driver.join().map_err(|_| {
                    Error::GraphInconsistency("construction driver panicked".to_string())
                })?;
                Ok::<_, Error>((built, analyzed))
            })?
        } else {
            let built = construction.run();
            let analyzed = analysis.run();
            (built, analyzed)
        };
        drop(analysis);

        let mut built_by_statement: Vec<Option<ConstructionEvent>> = (0..count).map(|_| None).collect();
        for event in built {
            let statement = event.statement();
            built_by_statement[statement] = Some(event);
        }
        let mut analyzed_by_statement: Vec<Option<AnalysisOutcome>> = (0..count).map(|_| None).collect();
        for outcome in analyzed {
            let statement = outcome.statement;
            analyzed_by_statement[statement] = Some(outcome);
        }

        let mut outcomes = Vec::with_capacity(count);
        let pieces = graphs
            .into_iter()
            .zip(staging)
            .zip(built_by_statement.into_iter().zip(analyzed_by_statement));
        for (statement, ((graph, stage), (built, analyzed))) in pieces.enumerate() {
            let outcome = match (built, analyzed) {
                (Some(ConstructionEvent::Failed { error, .. }), _) => {
                    StatementOutcome::Failed { statement, error }
                }
                (_, Some(AnalysisOutcome { result: Err(error), .. })) => {
                    StatementOutcome::Failed { statement, error }
                }
                (
                    Some(ConstructionEvent::Completed { .. }),
                    Some(AnalysisOutcome { result: Ok(stats), .. }),
                ) => self.complete(statement, graph, &stage, stats, bank),
                _ => StatementOutcome::Failed {
                    statement,
                    error: Error::GraphInconsistency(format!(
                        "statement {} finished without an outcome",
                        statement
                    )),
                },
            };
            if let StatementOutcome::Failed { error, .. } = &outcome {
                warn!(statement, error = %error, "statement is unrecommendable for this run");
            }
            outcomes.push(outcome);
        }

        let report = WorkloadReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            statements = count,
            failed = report.unrecommendable().len(),
            interactions = bank.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "workload analysis complete"
        );
        Ok(report)
    }

    fn complete(
        &self,
        statement: usize,
        graph: Arc<crate::ibg::IndexBenefitGraph>,
        stage: &InteractionBank,
        stats: crate::ibg::AnalyzerStats,
        bank: &InteractionBank,
    ) -> StatementOutcome {
        let mut graph = match Arc::try_unwrap(graph) {
            Ok(graph) => graph,
            Err(_) => {
                return StatementOutcome::Failed {
                    statement,
                    error: Error::GraphInconsistency(format!(
                        "graph of statement {} is still shared",
                        statement
                    )),
                }
            }
        };
        match finish_statement(statement, &mut graph, stats, &self.config) {
            Ok((construction, analysis, repair)) => {
                bank.merge_from(stage);
                StatementOutcome::Completed(CompletedStatement {
                    statement,
                    graph,
                    construction,
                    analysis,
                    repair,
                })
            }
            Err(error) => StatementOutcome::Failed { statement, error },
        }
    }
}
