//! Observers of the history stream. Each monitor throttles its own notifications against the
//! elapsed time recorded in the history, and owns all of its state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use linregress::fit_low_level_regression_model;
use serde::{Deserialize, Serialize};

use crate::event::Emitter;
use crate::history::{History, Record, Requirements, UncertaintyState};


pub trait Monitor: Send {
    /// Declares what the monitor needs retained in the history.
    fn configure(&mut self, requirements: &mut Requirements) {
        requirements.requires(1);
    }

    /// Called after every iteration. Must return promptly.
    fn on_history(&mut self, history: &History);

    /// Called exactly once when the run ends, however it ends.
    fn finalize(&mut self);
}

/// Decides whether enough time has passed since the last emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Throttle {
    interval: Duration,
    last: Option<Duration>,
}

impl Throttle {
    /// The first check passes regardless of time.
    pub fn immediate(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// The first check passes only once `interval` has elapsed since the start of the run.
    pub fn deferred(interval: Duration) -> Self {
        Self {
            interval,
            last: Some(Duration::ZERO),
        }
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        match self.last {
            None => true,
            Some(last) => elapsed >= last + self.interval,
        }
    }

    pub fn mark(&mut self, elapsed: Duration) {
        self.last = Some(elapsed);
    }
}

/// Emits a step/value summary at most once per interval.
pub struct ProgressMonitor {
    emitter: Emitter,
    throttle: Throttle,
    latest: Option<Record>,
}

impl ProgressMonitor {
    pub fn new(emitter: Emitter, interval: Duration) -> Self {
        Self {
            emitter,
            throttle: Throttle::immediate(interval),
            latest: None,
        }
    }
}

impl Monitor for ProgressMonitor {
    fn on_history(&mut self, history: &History) {
        let Some(record) = history.latest() else {
            return;
        };
        if self.throttle.is_due(record.elapsed) {
            self.throttle.mark(record.elapsed);
            self.emitter.progress(record);
        }
        self.latest = Some(record.clone());
    }

    fn finalize(&mut self) {
        if let Some(record) = &self.latest {
            self.emitter.progress(record);
        }
    }
}

/// Emits the best point whenever the best value strictly improves, at most once per interval.
/// Improvements arriving too soon are held back; a later improvement supersedes them.
pub struct ImprovementMonitor {
    emitter: Emitter,
    throttle: Throttle,
    best: Option<Record>,
}

impl ImprovementMonitor {
    pub fn new(emitter: Emitter, interval: Duration) -> Self {
        Self {
            emitter,
            throttle: Throttle::immediate(interval),
            best: None,
        }
    }
}

impl Monitor for ImprovementMonitor {
    fn on_history(&mut self, history: &History) {
        let Some(record) = history.latest() else {
            return;
        };
        let improved = match &self.best {
            None => true,
            Some(best) => record.value < best.value,
        };
        if !improved {
            return;
        }
        self.best = Some(record.clone());
        if self.throttle.is_due(record.elapsed) {
            self.throttle.mark(record.elapsed);
            self.emitter.improvement(record);
        }
    }

    fn finalize(&mut self) {
        if let Some(best) = &self.best {
            self.emitter.improvement(best);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub step: u64,
    pub best: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl ConvergencePoint {
    fn from_record(record: &Record) -> Self {
        match &record.population {
            Some(population) if !population.is_empty() => {
                let mut sorted = population.to_vec();
                sorted.sort_by(f64::total_cmp);
                Self {
                    step: record.step,
                    best: record.value,
                    min: sorted[0],
                    median: sorted[sorted.len() / 2],
                    max: sorted[sorted.len() - 1],
                }
            }
            _ => Self {
                step: record.step,
                best: record.value,
                min: record.value,
                median: record.value,
                max: record.value,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSummary {
    pub step: u64,
    pub best: f64,
    /// Least-squares slope of the best value per step across the trace.
    pub trend: Option<f64>,
    /// Oldest first.
    pub trace: Vec<ConvergencePoint>,
}

/// Keeps a rolling trace of the best value and the population spread.
pub struct ConvergenceMonitor {
    emitter: Emitter,
    throttle: Throttle,
    window: usize,
    trace: VecDeque<ConvergencePoint>,
}

impl ConvergenceMonitor {
    pub const DEFAULT_WINDOW: usize = 500;

    pub fn new(emitter: Emitter, interval: Duration) -> Self {
        Self::with_window(emitter, interval, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(emitter: Emitter, interval: Duration, window: usize) -> Self {
        let window = window.max(1);
        Self {
            emitter,
            throttle: Throttle::deferred(interval),
            window,
            trace: VecDeque::with_capacity(window),
        }
    }

    pub fn summary(&self) -> Option<ConvergenceSummary> {
        let latest = self.trace.back()?;
        Some(ConvergenceSummary {
            step: latest.step,
            best: latest.best,
            trend: trend(&self.trace),
            trace: self.trace.iter().cloned().collect(),
        })
    }
}

fn trend(trace: &VecDeque<ConvergencePoint>) -> Option<f64> {
    const MIN_POINTS: usize = 3;
    if trace.len() < MIN_POINTS {
        return None;
    }
    // response, intercept, step
    let mut data = Vec::with_capacity(trace.len() * 3);
    for point in trace {
        data.extend([point.best, 1.0, point.step as f64]);
    }
    let model = fit_low_level_regression_model(&data, trace.len(), 3).ok()?;
    model
        .parameters()
        .get(1)
        .copied()
        .filter(|slope| slope.is_finite())
}

impl Monitor for ConvergenceMonitor {
    fn on_history(&mut self, history: &History) {
        let Some(record) = history.latest() else {
            return;
        };
        if self.trace.len() == self.window {
            self.trace.pop_front();
        }
        self.trace.push_back(ConvergencePoint::from_record(record));
        if self.throttle.is_due(record.elapsed) {
            self.throttle.mark(record.elapsed);
            if let Some(summary) = self.summary() {
                self.emitter.convergence(summary);
            }
        }
    }

    fn finalize(&mut self) {
        if let Some(summary) = self.summary() {
            self.emitter.convergence(summary);
        }
    }
}

/// Forwards the sampler's uncertainty state on a slow cadence, and once more at the end.
pub struct UncertaintyMonitor {
    emitter: Emitter,
    throttle: Throttle,
    state: Option<Arc<UncertaintyState>>,
}

impl UncertaintyMonitor {
    pub fn new(emitter: Emitter, interval: Duration) -> Self {
        Self {
            emitter,
            throttle: Throttle::deferred(interval),
            state: None,
        }
    }
}

impl Monitor for UncertaintyMonitor {
    fn on_history(&mut self, history: &History) {
        let Some(record) = history.latest() else {
            return;
        };
        let Some(state) = &record.uncertainty else {
            return;
        };
        self.state = Some(state.clone());
        if self.throttle.is_due(record.elapsed) {
            self.throttle.mark(record.elapsed);
            self.emitter.uncertainty(state.clone());
        }
    }

    fn finalize(&mut self) {
        if let Some(state) = &self.state {
            self.emitter.uncertainty(state.clone());
        }
    }
}
