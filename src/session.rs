//! Runs a fit on a dedicated background thread and relays its output as [FitEvent]s.
//!
//! Configuration is validated and the algorithm is built before any thread is started, so a
//! bad fitter key or option is reported synchronously. Once started, a session always delivers
//! exactly one [FitEvent::Complete], after every other event of the run.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error};

use crate::algorithm::{Algorithm, FitterKind};
use crate::driver::{CancelToken, FitDriver, FitStats};
use crate::error::{panic_message, ConfigError, FitError};
use crate::event::{Emitter, FitEvent};
use crate::mapper::Mapper;
use crate::monitor::{
    ConvergenceMonitor, ImprovementMonitor, Monitor, ProgressMonitor, UncertaintyMonitor,
};
use crate::options::{invalid, FitOptions, MonitorIntervals};
use crate::problem::{Problem, ProblemId};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub fitter: FitterKind,
    pub options: FitOptions,
    pub mapper: Mapper,
    pub intervals: MonitorIntervals,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        self.intervals.validate()?;
        self.mapper
            .validate()
            .map_err(|err| invalid(err.to_string()))
    }
}

/// Monitors supplied by the caller, built against the run's emitter once it exists.
type MonitorFactory = Box<dyn FnOnce(Emitter) -> Box<dyn Monitor> + Send>;

pub struct FitSession {
    config: SessionConfig,
    algorithm: Option<Box<dyn Algorithm>>,
    extra_monitors: Vec<MonitorFactory>,
}

impl FitSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            algorithm: None,
            extra_monitors: vec![],
        }
    }

    /// Runs `algorithm` in place of the configured fitter.
    pub fn with_algorithm(mut self, algorithm: Box<dyn Algorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Appends a caller-defined monitor after the standard ones.
    pub fn with_monitor(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.extra_monitors.push(Box::new(move |_| monitor));
        self
    }

    /// Appends a caller-defined monitor that emits through the run's event channel.
    pub fn with_monitor_fn(
        mut self,
        factory: impl FnOnce(Emitter) -> Box<dyn Monitor> + Send + 'static,
    ) -> Self {
        self.extra_monitors.push(Box::new(factory));
        self
    }

    /// Snapshots `problem` and starts fitting it in the background. `problem` itself is never
    /// touched by the run; apply the outcome with [Problem::remember_best].
    pub fn start(self, problem: &Problem) -> Result<FitHandle, ConfigError> {
        self.config.validate()?;
        let (algorithm, name) = match self.algorithm {
            Some(algorithm) => (algorithm, "custom"),
            None => (
                self.config.fitter.build(&self.config.options)?,
                self.config.fitter.description(),
            ),
        };

        let mut snapshot = problem.snapshot();
        let id = snapshot.id();
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter::new(id, tx);
        let intervals = &self.config.intervals;
        let mut monitors: Vec<Box<dyn Monitor>> = vec![
            Box::new(ProgressMonitor::new(emitter.clone(), intervals.progress())),
            Box::new(ImprovementMonitor::new(emitter.clone(), intervals.improvement())),
            Box::new(ConvergenceMonitor::new(emitter.clone(), intervals.convergence())),
            Box::new(UncertaintyMonitor::new(emitter.clone(), intervals.uncertainty())),
        ];
        monitors.extend(
            self.extra_monitors
                .into_iter()
                .map(|factory| factory(emitter.clone())),
        );

        let cancel = CancelToken::default();
        let driver = FitDriver::with_algorithm(algorithm)
            .with_name(name)
            .with_mapper(self.config.mapper)
            .with_monitors(monitors)
            .with_cancel_token(cancel.clone());

        let join = thread::Builder::new()
            .name(format!("refit-fit-{}", id.value()))
            .spawn(move || {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| driver.execute(&mut snapshot)));
                match outcome {
                    Ok(result) => emitter.complete(result.best, result.stats),
                    Err(payload) => {
                        error!("fit thread panicked: {}", panic_message(payload.as_ref()));
                        emitter.complete(None, FitStats::default());
                    }
                }
                debug!("fit thread of problem {} exiting", id.value());
            })
            .map_err(|err| ConfigError::Spawn(err.to_string()))?;

        Ok(FitHandle {
            problem: id,
            events: rx,
            cancel,
            join: Some(join),
        })
    }
}

/// The caller's end of a running fit.
///
/// Dropping the handle does not stop the run; call [FitHandle::cancel] first if the outcome is
/// no longer wanted.
pub struct FitHandle {
    problem: ProblemId,
    events: UnboundedReceiver<FitEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl FitHandle {
    pub fn problem(&self) -> ProblemId {
        self.problem
    }

    /// The next pending event, without waiting.
    pub fn try_next(&mut self) -> Option<FitEvent> {
        self.events.try_recv().ok()
    }

    /// Waits for the next event. Yields `None` once the run has ended and every event has been
    /// received.
    pub async fn next(&mut self) -> Option<FitEvent> {
        self.events.recv().await
    }

    /// Blocking form of [FitHandle::next], for callers outside an async runtime. Panics if
    /// called from within one.
    pub fn blocking_next(&mut self) -> Option<FitEvent> {
        self.events.blocking_recv()
    }

    /// Asks the run to stop at the end of its current iteration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the background thread to exit. Undelivered events remain receivable.
    pub fn join(&mut self) -> Result<(), FitError> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|payload| FitError::Panicked(panic_message(payload.as_ref()))),
            None => Ok(()),
        }
    }
}
