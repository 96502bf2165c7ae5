//! Quasi-Newton descent with BFGS updates of the inverse Hessian. The search runs in unit
//! coordinates, where each parameter's range maps onto `[0, 1]`, so that parameters of very
//! different scales are stepped comparably. Gradients come from central differences, and both
//! the gradient and the line search are evaluated as batches.

use tracing::trace;

use crate::algorithm::{sanitise, Algorithm, Best, Solution};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::Generation;
use crate::mapper::{map_one, Map};
use crate::options::FitOptions;
use crate::problem::Problem;

const DIFF_STEP: f64 = 1e-6;
const LINE_SEARCH_STEPS: usize = 20;
const ARMIJO: f64 = 1e-4;
const MIN_CURVATURE: f64 = 1e-12;

pub struct Bfgs {
    options: FitOptions,
}

impl Bfgs {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

/// Maps between problem coordinates and the unit hypercube.
struct Scale {
    lo: Vec<f64>,
    width: Vec<f64>,
}

impl Scale {
    fn new(problem: &Problem) -> Self {
        Self {
            lo: problem
                .parameters()
                .iter()
                .map(|parameter| *parameter.bounds.start())
                .collect(),
            width: problem.parameters().iter().map(|parameter| parameter.width()).collect(),
        }
    }

    fn to_unit(&self, point: &[f64]) -> Vec<f64> {
        point
            .iter()
            .zip(self.lo.iter().zip(&self.width))
            .map(|(value, (lo, width))| if *width > 0.0 { (value - lo) / width } else { 0.0 })
            .collect()
    }

    fn to_point(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(self.lo.iter().zip(&self.width))
            .map(|(u, (lo, width))| lo + u.clamp(0.0, 1.0) * width)
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().map(|value| value.abs()).fold(0.0, f64::max)
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Applies the BFGS update to the inverse Hessian `h` for step `s` and gradient change `y`.
/// Skipped when the curvature condition fails.
fn bfgs_update(h: &mut [Vec<f64>], s: &[f64], y: &[f64]) -> bool {
    let sy = dot(s, y);
    if sy <= MIN_CURVATURE {
        return false;
    }
    let rho = 1.0 / sy;
    let hy = mat_vec(h, y);
    let yhy = dot(y, &hy);
    let ss_coef = rho * rho * yhy + rho;
    for (i, row) in h.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell += -rho * (s[i] * hy[j] + hy[i] * s[j]) + ss_coef * s[i] * s[j];
        }
    }
    true
}

impl Bfgs {
    /// Central-difference gradient in unit coordinates, from one batch of `2n` points.
    fn gradient(&self, scale: &Scale, map: &mut dyn Map, unit: &[f64]) -> Result<Vec<f64>, FitError> {
        let n = unit.len();
        let mut offsets = Vec::with_capacity(2 * n);
        let mut points = Vec::with_capacity(2 * n);
        for dimension in 0..n {
            let plus = (unit[dimension] + DIFF_STEP).min(1.0);
            let minus = (unit[dimension] - DIFF_STEP).max(0.0);
            offsets.push(plus - minus);
            for shifted in [plus, minus] {
                let mut probe = unit.to_vec();
                probe[dimension] = shifted;
                points.push(scale.to_point(&probe));
            }
        }
        let values = map.map(&points)?;
        Ok(offsets
            .iter()
            .enumerate()
            .map(|(dimension, &offset)| {
                let (plus, minus) = (values[2 * dimension], values[2 * dimension + 1]);
                let slope = (plus - minus) / offset;
                if offset > 0.0 && slope.is_finite() {
                    slope
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// Backtracking along `direction`; all candidate step lengths are evaluated in one batch.
    /// Returns the longest step meeting the sufficient-decrease condition, else the best
    /// improving step, else nothing.
    fn line_search(
        &self,
        scale: &Scale,
        map: &mut dyn Map,
        unit: &[f64],
        value: f64,
        gradient: &[f64],
        direction: &[f64],
    ) -> Result<Option<(Vec<f64>, f64)>, FitError> {
        let candidates: Vec<Vec<f64>> = (0..LINE_SEARCH_STEPS)
            .map(|k| {
                let alpha = 0.5_f64.powi(k as i32);
                unit.iter()
                    .zip(direction)
                    .map(|(u, d)| (u + alpha * d).clamp(0.0, 1.0))
                    .collect()
            })
            .collect();
        let points: Vec<_> = candidates.iter().map(|u| scale.to_point(u)).collect();
        let values: Vec<_> = map.map(&points)?.into_iter().map(sanitise).collect();

        let mut fallback: Option<usize> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let step: Vec<_> = candidate.iter().zip(unit).map(|(a, b)| a - b).collect();
            if values[index] <= value + ARMIJO * dot(gradient, &step) && values[index] < value {
                return Ok(Some((candidates[index].clone(), values[index])));
            }
            if values[index] < value
                && fallback.map_or(true, |best| values[index] < values[best])
            {
                fallback = Some(index);
            }
        }
        Ok(fallback.map(|index| (candidates[index].clone(), values[index])))
    }
}

impl Algorithm for Bfgs {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let scale = Scale::new(problem);
        let mut unit = scale.to_unit(&problem.getp());
        let mut value = sanitise(map_one(map, &scale.to_point(&unit))?);
        let mut inverse_hessian = identity(unit.len());
        let mut previous: Option<(Vec<f64>, Vec<f64>)> = None;
        let mut converged = false;
        let mut scaled = false;

        let mut step = 0;
        let status = loop {
            let generation = Generation::new(step, value, scale.to_point(&unit));
            if control.advance(generation).is_break() {
                break FitStatus::Cancelled;
            }
            if converged {
                break FitStatus::Converged;
            }
            step += 1;
            if step >= self.options.steps {
                break FitStatus::StepLimit;
            }

            let gradient = self.gradient(&scale, map, &unit)?;
            if let Some((s, previous_gradient)) = previous.take() {
                let y: Vec<_> = gradient
                    .iter()
                    .zip(&previous_gradient)
                    .map(|(g, p)| g - p)
                    .collect();
                if !scaled {
                    // size the initial inverse Hessian to the observed curvature
                    let (sy, yy) = (dot(&s, &y), dot(&y, &y));
                    if sy > MIN_CURVATURE && yy > 0.0 {
                        inverse_hessian = identity(unit.len());
                        inverse_hessian
                            .iter_mut()
                            .flatten()
                            .for_each(|cell| *cell *= sy / yy);
                        scaled = true;
                    }
                }
                if !bfgs_update(&mut inverse_hessian, &s, &y) {
                    trace!("skipped curvature update at step {step}");
                }
            }
            if inf_norm(&gradient) <= self.options.gtol {
                break FitStatus::Converged;
            }

            let mut direction: Vec<_> = mat_vec(&inverse_hessian, &gradient)
                .into_iter()
                .map(|d| -d)
                .collect();
            if dot(&direction, &gradient) >= 0.0 {
                trace!("lost descent direction at step {step}, resetting");
                inverse_hessian = identity(unit.len());
                scaled = false;
                direction = gradient.iter().map(|g| -g).collect();
            }
            // no single step may cross more than the whole unit box
            let longest = inf_norm(&direction);
            if longest > 1.0 {
                direction.iter_mut().for_each(|d| *d /= longest);
            }

            let Some((next_unit, next_value)) =
                self.line_search(&scale, map, &unit, value, &gradient, &direction)?
            else {
                converged = true;
                continue;
            };
            let s: Vec<_> = next_unit.iter().zip(&unit).map(|(a, b)| a - b).collect();
            let decrease = value - next_value;
            converged = inf_norm(&s) <= self.options.xtol && decrease <= self.options.ftol;
            previous = Some((s, gradient));
            unit = next_unit;
            value = next_value;
        };

        Ok(Solution {
            best: Best::new(scale.to_point(&unit), value),
            status,
        })
    }
}
