//! Differential evolution, rand/1/bin. Each generation's trial population is evaluated as one
//! batch.

use tinyrand::{Rand, Seeded, StdRand};

use crate::algorithm::{
    argmin, init_population, pick_distinct, population_size, random_f64, random_index, reflect,
    sanitise, Algorithm, Best, Solution,
};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::Generation;
use crate::mapper::Map;
use crate::options::FitOptions;
use crate::problem::Problem;

const MIN_POPULATION: usize = 5;

pub struct DifferentialEvolution {
    options: FitOptions,
}

impl DifferentialEvolution {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }

    fn trial(
        &self,
        problem: &Problem,
        population: &[Vec<f64>],
        target: usize,
        rand: &mut impl Rand,
    ) -> Vec<f64> {
        let picked = pick_distinct(rand, population.len(), target, 3);
        let (a, b, c) = (&population[picked[0]], &population[picked[1]], &population[picked[2]]);
        let dim = problem.dim();
        let forced = random_index(rand, dim);
        problem
            .parameters()
            .iter()
            .enumerate()
            .map(|(j, parameter)| {
                if j == forced || random_f64(rand) < self.options.crossover {
                    let mutant = a[j] + self.options.mutation * (b[j] - c[j]);
                    reflect(mutant, *parameter.bounds.start(), *parameter.bounds.end())
                } else {
                    population[target][j]
                }
            })
            .collect()
    }
}

impl Algorithm for DifferentialEvolution {
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
                .map(|target| self.trial(problem, &population, target, &mut rand))
                .collect();
            let trial_values = map.map(&trials)?;
            for (index, (trial, value)) in trials.into_iter().zip(trial_values).enumerate() {
                let value = sanitise(value);
                if value <= values[index] {
                    population[index] = trial;
                    values[index] = value;
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
