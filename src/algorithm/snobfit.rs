//! Model-based global search over a shrinking box.
//!
//! Each generation samples the current search box, either on a regular hypergrid or, when the
//! grid would be too large, uniformly at random. Probes either side of the incumbent along every
//! axis feed a separable quadratic model, whose minimiser is evaluated as well. The box is then
//! re-centred on the incumbent and shrunk by a constant factor, within the parameter bounds.

use std::ops::RangeInclusive;

use tinyrand::{Seeded, StdRand};
use tracing::debug;

use crate::algorithm::{
    argmin, population_size, random_f64, sanitise, Algorithm, Best, Solution,
};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::Generation;
use crate::mapper::{map_one, Map};
use crate::options::FitOptions;
use crate::problem::Problem;

const MAX_GRID_POINTS: usize = 1024;
const SHRINK: f64 = 2.0;

pub struct ModelSearch {
    options: FitOptions,
}

impl ModelSearch {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

/// Decodes `index` into per-axis ordinals, as the digits of a mixed-radix number.
fn pick(cardinalities: &[usize], index: u64, ordinals: &mut [usize]) {
    let mut residual = index;
    for (ordinal, &cardinality) in ordinals.iter_mut().zip(cardinalities) {
        let cardinality = cardinality as u64;
        *ordinal = (residual % cardinality) as usize;
        residual /= cardinality;
    }
}

pub(crate) fn grid_size(resolution: usize, dim: usize) -> Option<usize> {
    let mut size: usize = 1;
    for _ in 0..dim {
        size = size.checked_mul(resolution)?;
        if size > MAX_GRID_POINTS {
            return None;
        }
    }
    Some(size)
}

fn hypergrid(bounds: &[RangeInclusive<f64>], resolution: usize, size: usize) -> Vec<Vec<f64>> {
    let cardinalities = vec![resolution; bounds.len()];
    let mut ordinals = vec![0; bounds.len()];
    let inv_resolution = 1.0 / (resolution - 1) as f64;
    (0..size as u64)
        .map(|index| {
            pick(&cardinalities, index, &mut ordinals);
            ordinals
                .iter()
                .zip(bounds)
                .map(|(&ordinal, bound)| {
                    let range = bound.end() - bound.start();
                    bound.start() + ordinal as f64 * range * inv_resolution
                })
                .collect()
        })
        .collect()
}

/// Minimiser of the parabola through three points ordered by abscissa, or the middle point
/// when the parabola does not open upwards.
fn parabola_vertex((x1, f1): (f64, f64), (x2, f2): (f64, f64), (x3, f3): (f64, f64)) -> f64 {
    if !(x1 < x2 && x2 < x3) {
        return x2;
    }
    let curvature = ((f3 - f2) / (x3 - x2) - (f2 - f1) / (x2 - x1)) / (x3 - x1);
    if !(curvature > 0.0 && curvature.is_finite()) {
        return x2;
    }
    let numerator = (x2 - x1).powi(2) * (f2 - f3) - (x2 - x3).powi(2) * (f2 - f1);
    let denominator = (x2 - x1) * (f2 - f3) - (x2 - x3) * (f2 - f1);
    let vertex = x2 - 0.5 * numerator / denominator;
    if vertex.is_finite() {
        vertex
    } else {
        x2
    }
}

impl ModelSearch {
    /// Probes either side of `incumbent` along every axis and returns the model's minimiser.
    fn model_point(
        &self,
        map: &mut dyn Map,
        bounds: &[RangeInclusive<f64>],
        incumbent: &Best,
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>, Vec<f64>), FitError> {
        let steps: Vec<_> = bounds
            .iter()
            .map(|bound| (bound.end() - bound.start()) / (2.0 * (self.options.resolution - 1) as f64))
            .collect();
        let mut probes = Vec::with_capacity(2 * bounds.len());
        for (dimension, bound) in bounds.iter().enumerate() {
            for sign in [-1.0, 1.0] {
                let mut probe = incumbent.point.clone();
                probe[dimension] = (probe[dimension] + sign * steps[dimension])
                    .clamp(*bound.start(), *bound.end());
                probes.push(probe);
            }
        }
        let values: Vec<_> = map.map(&probes)?.into_iter().map(sanitise).collect();
        let model = bounds
            .iter()
            .enumerate()
            .map(|(dimension, bound)| {
                let (minus, plus) = (&probes[2 * dimension], &probes[2 * dimension + 1]);
                let vertex = parabola_vertex(
                    (minus[dimension], values[2 * dimension]),
                    (incumbent.point[dimension], incumbent.value),
                    (plus[dimension], values[2 * dimension + 1]),
                );
                vertex.clamp(*bound.start(), *bound.end())
            })
            .collect();
        Ok((model, probes, values))
    }
}

impl Algorithm for ModelSearch {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let mut rand = StdRand::seed(self.options.seed);
        let hard_bounds = problem.bounds();
        let mut bounds = hard_bounds.clone();
        let dim = problem.dim();
        let resolution = self.options.resolution;
        let grid = grid_size(resolution, dim);
        let samples = population_size(self.options.pop, dim, resolution)?;
        debug!(
            "global search over {dim} dimensions, {}",
            match grid {
                Some(size) => format!("grid of {size} points"),
                None => format!("{samples} random samples"),
            }
        );

        let x0 = problem.getp();
        let mut best = Best::new(x0.clone(), sanitise(map_one(map, &x0)?));

        let mut step = 0;
        let status = loop {
            let mut candidates = match grid {
                Some(size) => hypergrid(&bounds, resolution, size),
                None => (0..samples)
                    .map(|_| {
                        bounds
                            .iter()
                            .map(|bound| {
                                bound.start() + random_f64(&mut rand) * (bound.end() - bound.start())
                            })
                            .collect()
                    })
                    .collect(),
            };
            let mut values: Vec<_> = map.map(&candidates)?.into_iter().map(sanitise).collect();
            let sampled = argmin(&values);
            if values[sampled] < best.value {
                best = Best::new(candidates[sampled].clone(), values[sampled]);
            }

            let (model, probes, probe_values) = self.model_point(map, &bounds, &best)?;
            candidates.extend(probes);
            values.extend(probe_values);
            let model_value = sanitise(map_one(map, &model)?);
            candidates.push(model);
            values.push(model_value);
            let refined = argmin(&values);
            if values[refined] < best.value {
                best = Best::new(candidates[refined].clone(), values[refined]);
            }

            let generation = Generation::new(step, best.value, best.point.clone())
                .with_population(values);
            if control.advance(generation).is_break() {
                break FitStatus::Cancelled;
            }

            for ((bound, hard), &centre) in bounds.iter_mut().zip(&hard_bounds).zip(&best.point) {
                let range = (bound.end() - bound.start()) * SHRINK / resolution as f64;
                let end = f64::min(f64::max(*hard.start(), centre - range / 2.0) + range, *hard.end());
                let start = f64::max(*hard.start(), end - range);
                *bound = start..=end;
            }
            let relative_width = bounds
                .iter()
                .zip(&hard_bounds)
                .map(|(bound, hard)| {
                    let hard_width = hard.end() - hard.start();
                    if hard_width > 0.0 {
                        (bound.end() - bound.start()) / hard_width
                    } else {
                        0.0
                    }
                })
                .fold(0.0, f64::max);
            if relative_width <= self.options.xtol {
                break FitStatus::Converged;
            }
            step += 1;
            if step >= self.options.steps {
                break FitStatus::StepLimit;
            }
        };

        Ok(Solution { best, status })
    }
}
