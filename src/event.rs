//! Immutable events delivered from a running fit to its observer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::algorithm::Best;
use crate::driver::FitStats;
use crate::history::{Record, UncertaintyState};
use crate::monitor::ConvergenceSummary;
use crate::problem::ProblemId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum FitEvent {
    Progress {
        problem: ProblemId,
        step: u64,
        value: f64,
        point: Arc<[f64]>,
    },
    Improvement {
        problem: ProblemId,
        step: u64,
        value: f64,
        point: Arc<[f64]>,
    },
    ConvergenceUpdate {
        problem: ProblemId,
        summary: ConvergenceSummary,
    },
    UncertaintyUpdate {
        problem: ProblemId,
        state: Arc<UncertaintyState>,
    },
    /// The single terminal event of a run. `best` is `None` when the run was aborted.
    Complete {
        problem: ProblemId,
        best: Option<Best>,
        stats: FitStats,
    },
}

impl FitEvent {
    pub fn problem(&self) -> ProblemId {
        match self {
            FitEvent::Progress { problem, .. }
            | FitEvent::Improvement { problem, .. }
            | FitEvent::ConvergenceUpdate { problem, .. }
            | FitEvent::UncertaintyUpdate { problem, .. }
            | FitEvent::Complete { problem, .. } => *problem,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, FitEvent::Complete { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            FitEvent::Progress { .. } => "progress",
            FitEvent::Improvement { .. } => "improvement",
            FitEvent::ConvergenceUpdate { .. } => "convergence_update",
            FitEvent::UncertaintyUpdate { .. } => "uncertainty_update",
            FitEvent::Complete { .. } => "complete",
        }
    }
}

/// The sending half of a run's event channel, stamped with the problem it reports on.
#[derive(Debug, Clone)]
pub struct Emitter {
    problem: ProblemId,
    tx: UnboundedSender<FitEvent>,
}

impl Emitter {
    pub fn new(problem: ProblemId, tx: UnboundedSender<FitEvent>) -> Self {
        Self { problem, tx }
    }

    pub fn problem(&self) -> ProblemId {
        self.problem
    }

    /// Never blocks. Events sent after the observer has gone away are discarded.
    pub fn emit(&self, event: FitEvent) {
        if self.tx.send(event).is_err() {
            trace!("observer of problem {} has gone away", self.problem.value());
        }
    }

    pub fn progress(&self, record: &Record) {
        self.emit(FitEvent::Progress {
            problem: self.problem,
            step: record.step,
            value: record.value,
            point: record.point.clone(),
        });
    }

    pub fn improvement(&self, record: &Record) {
        self.emit(FitEvent::Improvement {
            problem: self.problem,
            step: record.step,
            value: record.value,
            point: record.point.clone(),
        });
    }

    pub fn convergence(&self, summary: ConvergenceSummary) {
        self.emit(FitEvent::ConvergenceUpdate {
            problem: self.problem,
            summary,
        });
    }

    pub fn uncertainty(&self, state: Arc<UncertaintyState>) {
        self.emit(FitEvent::UncertaintyUpdate {
            problem: self.problem,
            state,
        });
    }

    pub fn complete(&self, best: Option<Best>, stats: FitStats) {
        self.emit(FitEvent::Complete {
            problem: self.problem,
            best,
            stats,
        });
    }
}
