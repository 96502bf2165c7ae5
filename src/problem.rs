//! Fit problems: an ordered parameter schema paired with an opaque cost function.
//!
//! A [Problem] is never shared with a running fit. The fit receives a [Problem::snapshot],
//! which owns its own copy of every parameter; the objective itself is shared, as it is
//! immutable and evaluated through `&self`.

use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::algorithm::Best;
use crate::error::{CostError, ProblemError};

#[cfg(test)]
mod tests;

static NEXT_PROBLEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a problem, shared by all of its snapshots. Events refer to the problem by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProblemId(u64);

impl ProblemId {
    fn next() -> Self {
        Self(NEXT_PROBLEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub bounds: RangeInclusive<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64, bounds: RangeInclusive<f64>) -> Self {
        Self {
            name: name.into(),
            value,
            bounds,
        }
    }

    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.name.trim().is_empty() {
            return Err(ProblemError::EmptyName);
        }
        let (lo, hi) = (*self.bounds.start(), *self.bounds.end());
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(ProblemError::InvalidBounds {
                name: self.name.clone(),
                lo,
                hi,
            });
        }
        self.check_value(self.value)
    }

    fn check_value(&self, value: f64) -> Result<(), ProblemError> {
        if !self.bounds.contains(&value) {
            return Err(ProblemError::OutOfBounds {
                name: self.name.clone(),
                value,
                lo: *self.bounds.start(),
                hi: *self.bounds.end(),
            });
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.bounds.end() - self.bounds.start()
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(*self.bounds.start(), *self.bounds.end())
    }
}

/// A cost function over a parameter vector; lower is better.
///
/// Implementations are evaluated concurrently from worker threads, and must not rely on
/// mutable state shared between points.
pub trait Objective: Send + Sync {
    fn cost(&self, point: &[f64]) -> Result<f64, CostError>;
}

struct FnObjective<F>(F);

impl<F> Objective for FnObjective<F>
where
    F: Fn(&[f64]) -> Result<f64, CostError> + Send + Sync,
{
    fn cost(&self, point: &[f64]) -> Result<f64, CostError> {
        (self.0)(point)
    }
}

pub struct Problem {
    id: ProblemId,
    parameters: Vec<Parameter>,
    objective: Arc<dyn Objective>,
}

impl Problem {
    /// Creates a problem from an explicit, ordered parameter schema. Every declaration is
    /// validated up front.
    pub fn new(
        parameters: Vec<Parameter>,
        objective: impl Objective + 'static,
    ) -> Result<Self, ProblemError> {
        if parameters.is_empty() {
            return Err(ProblemError::NoParameters);
        }
        let mut names = HashSet::with_capacity(parameters.len());
        for parameter in &parameters {
            parameter.validate()?;
            if !names.insert(parameter.name.as_str()) {
                return Err(ProblemError::DuplicateName(parameter.name.clone()));
            }
        }
        Ok(Self {
            id: ProblemId::next(),
            parameters,
            objective: Arc::new(objective),
        })
    }

    /// Creates a problem whose objective is a closure that may fail.
    pub fn try_from_fn(
        parameters: Vec<Parameter>,
        cost_f: impl Fn(&[f64]) -> Result<f64, CostError> + Send + Sync + 'static,
    ) -> Result<Self, ProblemError> {
        Self::new(parameters, FnObjective(cost_f))
    }

    /// Convenience constructor for objectives that cannot fail.
    pub fn from_fn(
        parameters: Vec<Parameter>,
        cost_f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Result<Self, ProblemError> {
        Self::try_from_fn(parameters, move |point| Ok(cost_f(point)))
    }

    pub fn id(&self) -> ProblemId {
        self.id
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect()
    }

    pub fn bounds(&self) -> Vec<RangeInclusive<f64>> {
        self.parameters
            .iter()
            .map(|parameter| parameter.bounds.clone())
            .collect()
    }

    /// The current parameter vector.
    pub fn getp(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|parameter| parameter.value)
            .collect()
    }

    /// Replaces the current parameter vector. Either every value is applied or none is.
    pub fn setp(&mut self, point: &[f64]) -> Result<(), ProblemError> {
        self.check_dim(point.len())?;
        for (parameter, &value) in self.parameters.iter().zip(point) {
            parameter.check_value(value)?;
        }
        for (parameter, &value) in self.parameters.iter_mut().zip(point) {
            parameter.value = value;
        }
        Ok(())
    }

    /// Assigns a single parameter by name.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), ProblemError> {
        let parameter = self
            .parameters
            .iter_mut()
            .find(|parameter| parameter.name == name)
            .ok_or_else(|| ProblemError::UnknownParameter(name.into()))?;
        parameter.check_value(value)?;
        parameter.value = value;
        Ok(())
    }

    fn check_dim(&self, actual: usize) -> Result<(), ProblemError> {
        if actual != self.dim() {
            return Err(ProblemError::DimensionMismatch {
                expected: self.dim(),
                actual,
            });
        }
        Ok(())
    }

    pub fn cost(&self, point: &[f64]) -> Result<f64, CostError> {
        self.objective.cost(point)
    }

    /// A shared handle to the objective, for evaluation off the owning thread.
    pub fn objective(&self) -> Arc<dyn Objective> {
        self.objective.clone()
    }

    /// Clamps each coordinate of `point` into its parameter's bounds.
    pub fn clip(&self, point: &mut [f64]) {
        for (parameter, value) in self.parameters.iter().zip(point.iter_mut()) {
            *value = parameter.clip(*value);
        }
    }

    /// Produces an independent copy for use by a fit. Mutations of either copy are never
    /// observed by the other.
    pub fn snapshot(&self) -> Problem {
        Problem {
            id: self.id,
            parameters: self.parameters.clone(),
            objective: self.objective.clone(),
        }
    }

    /// Applies the best point of a completed fit.
    pub fn remember_best(&mut self, best: &Best) -> Result<(), ProblemError> {
        self.setp(&best.point)
    }

    /// One line per parameter, showing the value of `point` and its position within the bounds.
    pub fn summarize(&self, point: &[f64]) -> Vec<String> {
        self.parameters
            .iter()
            .zip(point)
            .map(|(parameter, &value)| {
                let width = parameter.width();
                let position = if width > 0.0 {
                    (value - parameter.bounds.start()) / width * 100.0
                } else {
                    50.0
                };
                format!(
                    "{:>20} = {:<14.6} in [{}, {}] {:5.1}%",
                    parameter.name,
                    value,
                    parameter.bounds.start(),
                    parameter.bounds.end(),
                    position
                )
            })
            .collect()
    }
}

impl Debug for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("id", &self.id)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
