//! Tunables of the fitters and of the monitor cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitOptions {
    /// Iteration (generation) budget.
    pub steps: u64,
    /// Population size per fitted parameter, for population-based fitters.
    pub pop: usize,
    /// Convergence tolerance on the spread of points.
    pub xtol: f64,
    /// Convergence tolerance on the spread of values.
    pub ftol: f64,
    /// Convergence tolerance on the largest gradient component, for gradient-based fitters.
    /// Gradients are taken over each parameter's range scaled to unit width.
    pub gtol: f64,
    /// Initial step as a fraction of each parameter's range.
    pub radius: f64,
    /// Crossover probability of evolutionary fitters.
    pub crossover: f64,
    /// Differential weight of evolutionary fitters.
    pub mutation: f64,
    /// Grid points per dimension of the global search.
    pub resolution: usize,
    /// Generations discarded by the sampler before draws are retained.
    pub burn: u64,
    /// Maximum number of retained sampler draws.
    pub samples: usize,
    pub seed: u64,
}

impl FitOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MIN_POP: usize = 1;
        const MAX_POP: usize = 1_000;
        const MIN_RESOLUTION: usize = 3;
        const MAX_SAMPLES: usize = 10_000_000;
        if self.steps == 0 {
            return Err(invalid("at least one step must be allowed"));
        }
        if self.pop < MIN_POP {
            return Err(invalid(format!("pop cannot be less than {MIN_POP}")));
        }
        if self.pop > MAX_POP {
            return Err(invalid(format!("pop cannot exceed {MAX_POP}")));
        }
        if !self.xtol.is_finite() || self.xtol < 0.0 {
            return Err(invalid("xtol must be finite and non-negative"));
        }
        if !self.ftol.is_finite() || self.ftol < 0.0 {
            return Err(invalid("ftol must be finite and non-negative"));
        }
        if !self.gtol.is_finite() || self.gtol < 0.0 {
            return Err(invalid("gtol must be finite and non-negative"));
        }
        if !(self.radius > 0.0 && self.radius <= 1.0) {
            return Err(invalid("radius must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.crossover) {
            return Err(invalid("crossover must lie in [0, 1]"));
        }
        if !(self.mutation > 0.0 && self.mutation <= 2.0) {
            return Err(invalid("mutation must lie in (0, 2]"));
        }
        if self.resolution < MIN_RESOLUTION {
            return Err(invalid(format!(
                "resolution cannot be less than {MIN_RESOLUTION}"
            )));
        }
        if self.samples == 0 {
            return Err(invalid("at least one sample must be retained"));
        }
        if self.samples > MAX_SAMPLES {
            return Err(invalid(format!("samples cannot exceed {MAX_SAMPLES}")));
        }
        Ok(())
    }

    /// Small budgets for demos and smoke tests.
    pub fn fast() -> Self {
        Self {
            steps: 100,
            pop: 5,
            samples: 1_000,
            burn: 20,
            ..Self::default()
        }
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            steps: 1_000,
            pop: 10,
            xtol: 1e-6,
            ftol: 1e-8,
            gtol: 1e-8,
            radius: 0.15,
            crossover: 0.9,
            mutation: 0.5,
            resolution: 5,
            burn: 100,
            samples: 10_000,
            seed: 0x5eed,
        }
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidOption(message.into())
}

/// Seconds between notifications, per monitor. Each must be representable as a [Duration].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorIntervals {
    pub progress: f64,
    pub improvement: f64,
    pub convergence: f64,
    pub uncertainty: f64,
}

impl MonitorIntervals {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("progress", self.progress),
            ("improvement", self.improvement),
            ("convergence", self.convergence),
            ("uncertainty", self.uncertainty),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(invalid(format!(
                    "{name} interval must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }

    pub fn progress(&self) -> Duration {
        Duration::from_secs_f64(self.progress)
    }

    pub fn improvement(&self) -> Duration {
        Duration::from_secs_f64(self.improvement)
    }

    pub fn convergence(&self) -> Duration {
        Duration::from_secs_f64(self.convergence)
    }

    pub fn uncertainty(&self) -> Duration {
        Duration::from_secs_f64(self.uncertainty)
    }
}

impl Default for MonitorIntervals {
    fn default() -> Self {
        Self {
            progress: 5.0,
            improvement: 5.0,
            convergence: 5.0,
            uncertainty: 15.0,
        }
    }
}
