//! The optimiser family. Every fitter is selected by a registry key and runs behind the
//! [Algorithm] capability: it evaluates candidates in batches through a [Map] and reports one
//! [Generation](crate::history::Generation) per iteration through [Control].

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter, EnumString};
use tinyrand::Rand;

use crate::driver::{Control, FitStatus};
use crate::error::{ConfigError, FitError};
use crate::mapper::Map;
use crate::options::FitOptions;
use crate::problem::Problem;

pub mod amoeba;
pub mod de;
pub mod dream;
pub mod newton;
pub mod rl;
pub mod snobfit;


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best {
    pub point: Vec<f64>,
    pub value: f64,
}

impl Best {
    pub fn new(point: Vec<f64>, value: f64) -> Self {
        Self { point, value }
    }
}

/// What an algorithm returns when it stops of its own accord or on request.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub best: Best,
    pub status: FitStatus,
}

pub trait Algorithm: Send {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError>;
}

/// Registry of the available fitters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FitterKind {
    #[default]
    Amoeba,
    De,
    Dream,
    Newton,
    Rl,
    Snobfit,
}

impl FitterKind {
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        key.parse()
            .map_err(|_| ConfigError::UnknownFitter(key.into()))
    }

    pub fn description(&self) -> &'static str {
        match self {
            FitterKind::Amoeba => "Nelder-Mead simplex",
            FitterKind::De => "differential evolution",
            FitterKind::Dream => "DREAM ensemble sampler",
            FitterKind::Newton => "quasi-Newton BFGS",
            FitterKind::Rl => "random lines",
            FitterKind::Snobfit => "model-based global search",
        }
    }

    /// Builds the fitter after validating `options`.
    pub fn build(&self, options: &FitOptions) -> Result<Box<dyn Algorithm>, ConfigError> {
        options.validate()?;
        let options = options.clone();
        Ok(match self {
            FitterKind::Amoeba => Box::new(amoeba::Amoeba::new(options)),
            FitterKind::De => Box::new(de::DifferentialEvolution::new(options)),
            FitterKind::Dream => Box::new(dream::Dream::new(options)),
            FitterKind::Newton => Box::new(newton::Bfgs::new(options)),
            FitterKind::Rl => Box::new(rl::RandomLines::new(options)),
            FitterKind::Snobfit => Box::new(snobfit::ModelSearch::new(options)),
        })
    }
}

/// Orders NaN costs after every other value.
pub(crate) fn sanitise(cost: f64) -> f64 {
    if cost.is_nan() {
        f64::INFINITY
    } else {
        cost
    }
}

pub(crate) fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, &value) in values.iter().enumerate() {
        if sanitise(value) < sanitise(values[best]) {
            best = index;
        }
    }
    best
}

/// Members of a population scaled by `pop` per fitted parameter, and never fewer than `min`.
pub(crate) fn population_size(pop: usize, dim: usize, min: usize) -> Result<usize, FitError> {
    pop.checked_mul(dim)
        .map(|size| size.max(min))
        .ok_or_else(|| FitError::Algorithm(format!("population of {pop} x {dim} is too large")))
}

/// Uniform in `[0, 1]`.
pub(crate) fn random_f64(rand: &mut impl Rand) -> f64 {
    rand.next_u64() as f64 / u64::MAX as f64
}

/// Uniform in `0..len`.
pub(crate) fn random_index(rand: &mut impl Rand, len: usize) -> usize {
    ((random_f64(rand) * len as f64) as usize).min(len - 1)
}

/// Standard normal, by the Box-Muller transform.
pub(crate) fn random_normal(rand: &mut impl Rand) -> f64 {
    let u1 = random_f64(rand).max(f64::MIN_POSITIVE);
    let u2 = random_f64(rand);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Picks `count` distinct indices from `0..len`, none equal to `exclude`.
pub(crate) fn pick_distinct(
    rand: &mut impl Rand,
    len: usize,
    exclude: usize,
    count: usize,
) -> Vec<usize> {
    let mut picked = Vec::with_capacity(count);
    while picked.len() < count {
        let candidate = random_index(rand, len);
        if candidate != exclude && !picked.contains(&candidate) {
            picked.push(candidate);
        }
    }
    picked
}

/// The current point followed by `size - 1` points drawn uniformly within the bounds.
pub(crate) fn init_population(
    problem: &Problem,
    size: usize,
    rand: &mut impl Rand,
) -> Vec<Vec<f64>> {
    let mut population = Vec::with_capacity(size);
    population.push(problem.getp());
    while population.len() < size {
        let member = problem
            .parameters()
            .iter()
            .map(|parameter| parameter.bounds.start() + random_f64(rand) * parameter.width())
            .collect();
        population.push(member);
    }
    population
}

/// Folds a coordinate that overshot its bounds back inside them.
pub(crate) fn reflect(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return lo;
    }
    let mut value = value;
    for _ in 0..8 {
        if value < lo {
            value = 2.0 * lo - value;
        } else if value > hi {
            value = 2.0 * hi - value;
        } else {
            return value;
        }
    }
    value.clamp(lo, hi)
}
