//! Nelder-Mead simplex search, with trial points clipped to the parameter bounds.

use tracing::trace;

use crate::algorithm::{sanitise, Algorithm, Best, Solution};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::Generation;
use crate::mapper::{map_one, Map};
use crate::options::FitOptions;
use crate::problem::Problem;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINKAGE: f64 = 0.5;

pub struct Amoeba {
    options: FitOptions,
}

impl Amoeba {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

struct Vertex {
    point: Vec<f64>,
    value: f64,
}

fn initial_simplex(problem: &Problem, radius: f64) -> Vec<Vec<f64>> {
    let x0 = problem.getp();
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.clone());
    for (dimension, parameter) in problem.parameters().iter().enumerate() {
        let step = radius * parameter.width();
        let mut vertex = x0.clone();
        vertex[dimension] = if x0[dimension] + step <= *parameter.bounds.end() {
            x0[dimension] + step
        } else {
            x0[dimension] - step
        };
        simplex.push(vertex);
    }
    simplex
}

fn centroid(vertices: &[Vertex]) -> Vec<f64> {
    let dim = vertices[0].point.len();
    let mut centroid = vec![0.0; dim];
    for vertex in vertices {
        for (sum, value) in centroid.iter_mut().zip(&vertex.point) {
            *sum += value;
        }
    }
    let count = vertices.len() as f64;
    centroid.iter_mut().for_each(|sum| *sum /= count);
    centroid
}

/// `from + coefficient * (towards - from)`, clipped.
fn project(problem: &Problem, from: &[f64], towards: &[f64], coefficient: f64) -> Vec<f64> {
    let mut point: Vec<_> = from
        .iter()
        .zip(towards)
        .map(|(from, towards)| from + coefficient * (towards - from))
        .collect();
    problem.clip(&mut point);
    point
}

impl Amoeba {
    fn is_converged(&self, simplex: &[Vertex]) -> bool {
        let best = &simplex[0];
        simplex[1..].iter().all(|vertex| {
            let x_spread = vertex
                .point
                .iter()
                .zip(&best.point)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            let f_spread = (vertex.value - best.value).abs();
            x_spread <= self.options.xtol && f_spread <= self.options.ftol
        })
    }
}

impl Algorithm for Amoeba {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let points = initial_simplex(problem, self.options.radius);
        let values = map.map(&points)?;
        let mut simplex: Vec<_> = points
            .into_iter()
            .zip(values)
            .map(|(point, value)| Vertex {
                point,
                value: sanitise(value),
            })
            .collect();
        let n = simplex.len() - 1;

        let mut step = 0;
        let status = loop {
            simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
            let generation = Generation::new(step, simplex[0].value, simplex[0].point.clone())
                .with_population(simplex.iter().map(|vertex| vertex.value).collect());
            if control.advance(generation).is_break() {
                break FitStatus::Cancelled;
            }
            if self.is_converged(&simplex) {
                break FitStatus::Converged;
            }
            step += 1;
            if step >= self.options.steps {
                break FitStatus::StepLimit;
            }

            let c = centroid(&simplex[..n]);
            let worst = &simplex[n];
            let reflected = project(problem, &c, &worst.point, -REFLECTION);
            let f_reflected = sanitise(map_one(map, &reflected)?);

            if f_reflected < simplex[0].value {
                let expanded = project(problem, &c, &reflected, EXPANSION);
                let f_expanded = sanitise(map_one(map, &expanded)?);
                simplex[n] = if f_expanded < f_reflected {
                    Vertex {
                        point: expanded,
                        value: f_expanded,
                    }
                } else {
                    Vertex {
                        point: reflected,
                        value: f_reflected,
                    }
                };
                continue;
            }
            if f_reflected < simplex[n - 1].value {
                simplex[n] = Vertex {
                    point: reflected,
                    value: f_reflected,
                };
                continue;
            }

            let (contracted, threshold) = if f_reflected < worst.value {
                (project(problem, &c, &reflected, CONTRACTION), f_reflected)
            } else {
                (project(problem, &c, &worst.point, CONTRACTION), worst.value)
            };
            let f_contracted = sanitise(map_one(map, &contracted)?);
            if f_contracted < threshold {
                simplex[n] = Vertex {
                    point: contracted,
                    value: f_contracted,
                };
                continue;
            }

            trace!("shrinking simplex at step {step}");
            let best = simplex[0].point.clone();
            let shrunk: Vec<_> = simplex[1..]
                .iter()
                .map(|vertex| project(problem, &best, &vertex.point, SHRINKAGE))
                .collect();
            let values = map.map(&shrunk)?;
            for ((vertex, point), value) in simplex[1..].iter_mut().zip(shrunk).zip(values) {
                vertex.point = point;
                vertex.value = sanitise(value);
            }
        };

        let best = simplex
            .iter()
            .min_by(|a, b| a.value.total_cmp(&b.value))
            .map(|vertex| Best::new(vertex.point.clone(), vertex.value))
            .ok_or_else(|| FitError::Algorithm("empty simplex".into()))?;
        Ok(Solution { best, status })
    }
}
