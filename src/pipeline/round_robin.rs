//! Fair interleaving of many graphs, one per workload statement.
//!
//! [`RoundRobinConstructor`] keeps one pending constructor per statement in a
//! min-heap keyed by accumulated construction time. Each round pops the
//! statement that has consumed the least time, performs exactly one
//! expansion, and pushes it back with its updated total, so one expensive
//! statement cannot starve the others.
//!
//! [`RoundRobinAnalyzer`] cycles over live analyzers, taking one non-blocking
//! step each. Only when every analyzer in a pass reports blocked does the
//! next pass allow a real wait, which avoids spinning while still picking up
//! opportunistic progress.

use crate::ibg::{
    AnalysisStep, AnalyzerStats, BuildStep, ConstructionStats, IbgAnalyzer, IbgConstructor,
    InteractionBank, WhatIfOracle,
};
use crate::Error;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Final state of one statement's construction.
#[derive(Debug)]
pub enum ConstructionEvent {
    Completed {
        statement: usize,
        stats: ConstructionStats,
    },
    Failed {
        statement: usize,
        error: Error,
    },
}

impl ConstructionEvent {
    pub fn statement(&self) -> usize {
        match self {
            ConstructionEvent::Completed { statement, .. }
            | ConstructionEvent::Failed { statement, .. } => *statement,
        }
    }
}

struct ScheduledConstruction<O> {
    elapsed: Duration,
    sequence: u64,
    constructor: IbgConstructor<O>,
}

impl<O> PartialEq for ScheduledConstruction<O> {
    fn eq(&self, other: &Self) -> bool {
        self.elapsed == other.elapsed && self.sequence == other.sequence
    }
}

impl<O> Eq for ScheduledConstruction<O> {}

impl<O> PartialOrd for ScheduledConstruction<O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<O> Ord for ScheduledConstruction<O> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap behavior (least elapsed first, then FIFO)
        other
            .elapsed
            .cmp(&self.elapsed)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct RoundRobinConstructor<O> {
    pending: BinaryHeap<ScheduledConstruction<O>>,
    next_sequence: u64,
    rounds: u64,
}

impl<O: WhatIfOracle> Default for RoundRobinConstructor<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WhatIfOracle> RoundRobinConstructor<O> {
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            next_sequence: 0,
            rounds: 0,
        }
    }

    pub fn add(&mut self, constructor: IbgConstructor<O>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(ScheduledConstruction {
            elapsed: Duration::ZERO,
            sequence,
            constructor,
        });
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Runs one round. Returns an event when a statement finished or failed,
    /// and `None` otherwise (including when nothing is pending).
    pub fn run_round(&mut self) -> Option<ConstructionEvent> {
        let mut task = self.pending.pop()?;
        self.rounds += 1;
        let statement = task.constructor.graph().statement();

        let started = Instant::now();
        let step = task.constructor.step();
        task.elapsed += started.elapsed();

        match step {
            Ok(BuildStep::Expanded(node)) => {
                trace!(
                    statement,
                    node = node.index(),
                    elapsed_us = task.elapsed.as_micros() as u64,
                    "round-robin expansion"
                );
                self.pending.push(task);
                None
            }
            Ok(BuildStep::Finished) => Some(ConstructionEvent::Completed {
                statement,
                stats: task.constructor.stats().clone(),
            }),
            Err(error) => {
                warn!(statement, error = %error, "statement construction failed");
                Some(ConstructionEvent::Failed { statement, error })
            }
        }
    }

    /// Drives every statement to completion or failure.
    pub fn run(mut self) -> Vec<ConstructionEvent> {
        let mut events = Vec::with_capacity(self.pending.len());
        while !self.pending.is_empty() {
            if let Some(event) = self.run_round() {
                events.push(event);
            }
        }
        events
    }
}

/// Final state of one statement's analysis.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub statement: usize,
    pub result: crate::Result<AnalyzerStats>,
}

struct AnalysisTask {
    analyzer: IbgAnalyzer,
    bank: Arc<InteractionBank>,
}

#[derive(Default)]
pub struct RoundRobinAnalyzer {
    live: Vec<AnalysisTask>,
    passes: u64,
    blocking_passes: u64,
}

impl RoundRobinAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an analyzer writing into `bank`.
    pub fn add(&mut self, analyzer: IbgAnalyzer, bank: Arc<InteractionBank>) {
        self.live.push(AnalysisTask { analyzer, bank });
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn blocking_passes(&self) -> u64 {
        self.blocking_passes
    }

    /// Runs passes until every analyzer is done or has failed.
    pub fn run(&mut self) -> Vec<AnalysisOutcome> {
        let mut outcomes = Vec::with_capacity(self.live.len());
        let mut allow_wait = false;

        while !self.live.is_empty() {
            self.passes += 1;
            if allow_wait {
                self.blocking_passes += 1;
                trace!(live = self.live.len(), "every analyzer blocked, waiting");
            }
            let mut wait = allow_wait;
            let mut all_blocked = true;
            let mut index = 0;

            while index < self.live.len() {
                let task = &mut self.live[index];
                match task.analyzer.step(&task.bank, wait) {
                    Ok(AnalysisStep::Progressed(_)) => {
                        all_blocked = false;
                        wait = false;
                        index += 1;
                    }
                    Ok(AnalysisStep::Blocked(_)) => index += 1,
                    Ok(AnalysisStep::Done) => {
                        all_blocked = false;
                        wait = false;
                        let task = self.live.remove(index);
                        outcomes.push(AnalysisOutcome {
                            statement: task.analyzer.graph().statement(),
                            result: Ok(task.analyzer.stats().clone()),
                        });
                    }
                    Err(error) => {
                        all_blocked = false;
                        wait = false;
                        let task = self.live.remove(index);
                        let statement = task.analyzer.graph().statement();
                        warn!(statement, error = %error, "statement analysis stopped");
                        outcomes.push(AnalysisOutcome {
                            statement,
                            result: Err(error),
                        });
                    }
                }
            }
            allow_wait = all_blocked;
        }
        outcomes
    }
}
