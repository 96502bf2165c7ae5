//! Random lines: a population search in which each member tries a random point on the line
//! through itself and the incumbent best. The best member itself searches along the line
//! between two other members. Trials replace their member only when they are no worse.

use tinyrand::{Rand, Seeded, StdRand};

use crate::algorithm::{
    argmin, init_population, pick_distinct, population_size, random_f64, reflect, sanitise,
    Algorithm, Best, Solution,
};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::Generation;
use crate::mapper::Map;
use crate::options::FitOptions;
use crate::problem::Problem;

const MIN_POPULATION: usize = 4;

pub struct RandomLines {
    options: FitOptions,
}

impl RandomLines {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }

    fn trial(
        &self,
        problem: &Problem,
        population: &[Vec<f64>],
        member: usize,
        best: usize,
        rand: &mut impl Rand,
    ) -> Vec<f64> {
        let origin = &population[member];
        let direction: Vec<f64> = if member == best {
            let pair = pick_distinct(rand, population.len(), member, 2);
            population[pair[0]]
                .iter()
                .zip(&population[pair[1]])
                .map(|(a, b)| (a - b) * self.options.mutation)
                .collect()
        } else {
            population[best]
                .iter()
                .zip(origin)
                .map(|(a, b)| a - b)
                .collect()
        };
        // mostly between the member and the anchor, occasionally beyond either end
        let t = 2.0 * random_f64(rand) - 0.25;
        problem
            .parameters()
            .iter()
            .zip(origin.iter().zip(direction))
            .map(|(parameter, (x, d))| {
                reflect(x + t * d, *parameter.bounds.start(), *parameter.bounds.end())
            })
            .collect()
    }
}

impl Algorithm for RandomLines {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let mut rand = StdRand::seed(self.options.seed);
        let size = population_size(self.options.pop, problem.dim(), MIN_POPULATION)?;
        let mut population = init_population(problem, size, &mut rand);
        let mut values: Vec<_> = map.map(&population)?.into_iter().map(sanitise).collect();

        let mut step = 0;
        let status = loop {
            let best = argmin(&values);
            let generation = Generation::new(step, values[best], population[best].clone())
                .with_population(values.clone());
            if control.advance(generation).is_break() {
                break FitStatus::Cancelled;
            }
            let worst = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if worst - values[best] <= self.options.ftol {
                break FitStatus::Converged;
            }
            step += 1;
            if step >= self.options.steps {
                break FitStatus::StepLimit;
            }

            let trials: Vec<_> = (0..size)
                .map(|member| self.trial(problem, &population, member, best, &mut rand))
                .collect();
            let trial_values = map.map(&trials)?;
            for (member, (trial, value)) in trials.into_iter().zip(trial_values).enumerate() {
                let value = sanitise(value);
                if value <= values[member] {
                    population[member] = trial;
                    values[member] = value;
                }
            }
        };

        let best = argmin(&values);
        Ok(Solution {
            best: Best::new(population[best].clone(), values[best]),
            status,
        })
    }
}
