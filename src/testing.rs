//! Testing helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_float_eq::*;

use crate::algorithm::{Algorithm, Best, Solution};
use crate::driver::{Control, FitStatus};
use crate::error::{CostError, FitError};
use crate::history::{Generation, History};
use crate::mapper::Map;
use crate::monitor::Monitor;
use crate::problem::{Parameter, Problem};

pub fn assert_slice_f64_relative(expected: &[f64], actual: &[f64], epsilon: f64) {
    assert_eq!(
        expected.len(),
        actual.len(),
        "lengths do not match: {} ≠ {}",
        expected.len(),
        actual.len()
    );
    for (index, &expected) in expected.iter().enumerate() {
        let actual = actual[index];
        if actual != expected {
            assert_float_relative_eq!(expected, actual, epsilon);
        }
    }
}

/// `(x - 3)^2`, starting from 0 within `[-5, 10]`.
pub fn parabola() -> Problem {
    Problem::from_fn(vec![Parameter::new("x", 0.0, -5.0..=10.0)], |point| {
        (point[0] - 3.0).powi(2)
    })
    .unwrap()
}

/// A separable quadratic bowl with its minimum of 0 at `centre`.
pub fn bowl(centre: &[f64]) -> Problem {
    let parameters = centre
        .iter()
        .enumerate()
        .map(|(index, _)| Parameter::new(format!("p{index}"), 0.0, -10.0..=10.0))
        .collect();
    let centre = centre.to_vec();
    Problem::from_fn(parameters, move |point| {
        point
            .iter()
            .zip(&centre)
            .enumerate()
            .map(|(index, (x, c))| (index + 1) as f64 * (x - c).powi(2))
            .sum()
    })
    .unwrap()
}

/// Evaluates `x[0]^2` but fails for any point whose first coordinate equals `poison`.
pub fn poisoned(poison: f64) -> Problem {
    Problem::try_from_fn(vec![Parameter::new("x", 0.0, -10.0..=10.0)], move |point| {
        if point[0] == poison {
            Err(CostError::from(format!("poisoned at {poison}")))
        } else {
            Ok(point[0].powi(2))
        }
    })
    .unwrap()
}

/// Counts the calls made to a monitor, and keeps the values it was shown.
#[derive(Debug, Default)]
pub struct Tally {
    pub histories: AtomicUsize,
    pub finalized: AtomicUsize,
    pub values: Mutex<Vec<f64>>,
}

pub struct TallyMonitor(pub Arc<Tally>);

impl Monitor for TallyMonitor {
    fn on_history(&mut self, history: &History) {
        self.0.histories.fetch_add(1, Ordering::SeqCst);
        if let Some(record) = history.latest() {
            self.0.values.lock().unwrap().push(record.value);
        }
    }

    fn finalize(&mut self) {
        self.0.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

/// Submits one single-point batch per iteration, at `1.0, 2.0, 3.0, ...`, reporting the
/// point as the best so far.
pub struct Stepper {
    pub iterations: u64,
    pub fail_after: Option<u64>,
    pub panic_after: Option<u64>,
}

impl Stepper {
    pub fn new(iterations: u64) -> Self {
        Self {
            iterations,
            fail_after: None,
            panic_after: None,
        }
    }
}

impl Algorithm for Stepper {
    fn run(
        &mut self,
        _problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let mut best = Best::new(vec![0.0], f64::INFINITY);
        for step in 0..self.iterations {
            if self.fail_after == Some(step) {
                return Err(FitError::Algorithm(format!("failed after {step} iterations")));
            }
            if self.panic_after == Some(step) {
                panic!("panicked after {step} iterations");
            }
            let point = vec![(step + 1) as f64];
            let value = map.map(&[point.clone()])?[0];
            if value < best.value {
                best = Best::new(point, value);
            }
            let generation = Generation::new(step, best.value, best.point.clone());
            if control.advance(generation).is_break() {
                return Ok(Solution {
                    best,
                    status: FitStatus::Cancelled,
                });
            }
        }
        Ok(Solution {
            best,
            status: FitStatus::StepLimit,
        })
    }
}
