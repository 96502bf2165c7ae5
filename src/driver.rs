//! Runs one fit to completion: starts the mapper, drives the algorithm, feeds every history
//! record to the monitors in registration order and finalises each monitor exactly once,
//! whatever way the algorithm exits.

use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::algorithm::{Algorithm, Best, FitterKind, Solution};
use crate::display::DisplayPoint;
use crate::error::{panic_message, ConfigError, FitError};
use crate::history::{Generation, History, Requirements};
use crate::mapper::{Map, Mapper};
use crate::monitor::Monitor;
use crate::options::FitOptions;
use crate::problem::Problem;


/// A cooperative stop request, checked by the algorithm between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    /// The algorithm met its own convergence criterion.
    Converged,
    /// The iteration budget ran out.
    StepLimit,
    /// Stopped on request, with the best point found so far.
    Cancelled,
    /// The run failed and produced no result.
    #[default]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FitStats {
    pub status: FitStatus,
    pub steps: u64,
    pub batches: u64,
    pub evaluations: u64,
    pub elapsed: Duration,
}

/// The outcome of a run. `best` is absent when the run was aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub best: Option<Best>,
    pub stats: FitStats,
}

impl FitResult {
    pub fn is_aborted(&self) -> bool {
        self.best.is_none()
    }
}

/// The algorithm's handle on the history stream and the cancellation flag.
pub struct Control<'a> {
    history: History,
    monitors: &'a mut [Box<dyn Monitor>],
    cancel: &'a CancelToken,
    started: Instant,
    steps: u64,
}

impl<'a> Control<'a> {
    pub fn new(
        requirements: &Requirements,
        monitors: &'a mut [Box<dyn Monitor>],
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            history: History::new(requirements),
            monitors,
            cancel,
            started: Instant::now(),
            steps: 0,
        }
    }

    /// Records the end of an iteration and notifies every monitor. Breaks when a stop has
    /// been requested.
    pub fn advance(&mut self, generation: Generation) -> ControlFlow<()> {
        self.history
            .push(generation.into_record(self.started.elapsed()));
        self.steps += 1;
        for monitor in self.monitors.iter_mut() {
            monitor.on_history(&self.history);
        }
        if self.cancel.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

pub struct FitDriver {
    algorithm: Box<dyn Algorithm>,
    name: String,
    mapper: Mapper,
    monitors: Vec<Box<dyn Monitor>>,
    cancel: CancelToken,
}

impl FitDriver {
    /// Resolves `kind` against the registry. Fails on invalid options.
    pub fn new(kind: FitterKind, options: &FitOptions) -> Result<Self, ConfigError> {
        let algorithm = kind.build(options)?;
        Ok(Self::with_algorithm(algorithm).with_name(kind.description()))
    }

    pub fn with_algorithm(algorithm: Box<dyn Algorithm>) -> Self {
        Self {
            algorithm,
            name: "custom".into(),
            mapper: Mapper::default(),
            monitors: vec![],
            cancel: CancelToken::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_monitor(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    pub fn with_monitors(mut self, monitors: impl IntoIterator<Item = Box<dyn Monitor>>) -> Self {
        self.monitors.extend(monitors);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the fit against `problem`, which should be a snapshot owned by the caller. On
    /// success the best point is applied to `problem`.
    pub fn execute(mut self, problem: &mut Problem) -> FitResult {
        let started = Instant::now();
        info!(
            "fitting {} parameters of problem {} with {}",
            problem.dim(),
            problem.id().value(),
            self.name
        );
        let mut requirements = Requirements::default();
        for monitor in &mut self.monitors {
            monitor.configure(&mut requirements);
        }

        let (outcome, steps, batches, evaluations) = match self.mapper.start(problem) {
            Ok(mut map) => {
                let mut control = Control::new(&requirements, &mut self.monitors, &self.cancel);
                let algorithm = &mut self.algorithm;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    algorithm.run(problem, map.as_mut(), &mut control)
                }))
                .unwrap_or_else(|payload| {
                    Err(FitError::Panicked(panic_message(payload.as_ref())))
                });
                (outcome, control.steps(), map.batches(), map.evaluations())
            }
            Err(err) => (Err(FitError::from(err)), 0, 0, 0),
        };

        finalize_all(&mut self.monitors);

        let mut stats = FitStats {
            status: FitStatus::Aborted,
            steps,
            batches,
            evaluations,
            elapsed: started.elapsed(),
        };
        match outcome {
            Ok(Solution { best, status }) => {
                stats.status = status;
                info!(
                    "fit {status} after {steps} steps, {evaluations} evaluations, {:?}: value {:.6e} at {}",
                    stats.elapsed,
                    best.value,
                    DisplayPoint::from(&*best.point)
                );
                if let Err(err) = problem.setp(&best.point) {
                    warn!("could not apply best point to snapshot: {err}");
                }
                FitResult {
                    best: Some(best),
                    stats,
                }
            }
            Err(err) => {
                warn!("fit aborted after {steps} steps: {err}");
                FitResult { best: None, stats }
            }
        }
    }
}

/// Finalises every monitor once. A panicking monitor does not deprive the others.
fn finalize_all(monitors: &mut [Box<dyn Monitor>]) {
    for (index, monitor) in monitors.iter_mut().enumerate() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| monitor.finalize())) {
            warn!(
                "monitor {index} panicked during finalize: {}",
                panic_message(payload.as_ref())
            );
        }
    }
    debug!("finalized {} monitors", monitors.len());
}
