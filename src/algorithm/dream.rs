//! DREAM: an ensemble of Markov chains whose proposals are built from the differences between
//! other chains, with randomized subspace crossover. The cost is read as a negative
//! log-density. Once the burn-in has passed, every generation's chain states are retained as
//! posterior draws, and each generation reports the accumulated uncertainty state.
//!
//! The sampler runs for the full step budget; it has no convergence criterion of its own.

use tinyrand::{Rand, Seeded, StdRand};
use tracing::debug;

use crate::algorithm::{
    argmin, init_population, pick_distinct, population_size, random_f64, random_index, random_normal,
    reflect, sanitise, Algorithm, Best, Solution,
};
use crate::driver::{Control, FitStatus};
use crate::error::FitError;
use crate::history::{Draws, Generation, UncertaintyState};
use crate::mapper::Map;
use crate::options::FitOptions;
use crate::problem::Problem;

const MIN_CHAINS: usize = 4;
/// Every so often a unit jump lets the chains hop between modes.
const UNIT_JUMP_EVERY: u64 = 5;
const JUMP_JITTER: f64 = 0.1;
const NOISE: f64 = 1e-6;

pub struct Dream {
    options: FitOptions,
}

impl Dream {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

struct Chains {
    states: Vec<Vec<f64>>,
    logp: Vec<f64>,
}

fn log_density(cost: f64) -> f64 {
    -sanitise(cost)
}

impl Dream {
    fn propose(
        &self,
        problem: &Problem,
        chains: &Chains,
        chain: usize,
        step: u64,
        rand: &mut impl Rand,
    ) -> Vec<f64> {
        let dim = problem.dim();
        let mut crossed: Vec<bool> = (0..dim)
            .map(|_| random_f64(rand) < self.options.crossover)
            .collect();
        if !crossed.contains(&true) {
            crossed[random_index(rand, dim)] = true;
        }
        let d_eff = crossed.iter().filter(|&&crossed| crossed).count();
        let gamma = if step % UNIT_JUMP_EVERY == 0 {
            1.0
        } else {
            2.38 / (2.0 * d_eff as f64).sqrt()
        };

        let pair = pick_distinct(rand, chains.states.len(), chain, 2);
        let (a, b) = (&chains.states[pair[0]], &chains.states[pair[1]]);
        let current = &chains.states[chain];
        let scale = (1.0 + JUMP_JITTER * (2.0 * random_f64(rand) - 1.0)) * gamma;
        problem
            .parameters()
            .iter()
            .enumerate()
            .map(|(j, parameter)| {
                if !crossed[j] {
                    return current[j];
                }
                let noise = NOISE * parameter.width() * random_normal(rand);
                let proposal = current[j] + scale * (a[j] - b[j]) + noise;
                reflect(proposal, *parameter.bounds.start(), *parameter.bounds.end())
            })
            .collect()
    }
}

impl Algorithm for Dream {
    fn run(
        &mut self,
        problem: &mut Problem,
        map: &mut dyn Map,
        control: &mut Control,
    ) -> Result<Solution, FitError> {
        let mut rand = StdRand::seed(self.options.seed);
        let size = population_size(self.options.pop, problem.dim(), MIN_CHAINS)?;
        let labels: Vec<String> = problem.labels().into_iter().map(String::from).collect();
        let states = init_population(problem, size, &mut rand);
        let costs = map.map(&states)?;
        let mut chains = Chains {
            logp: costs.iter().copied().map(log_density).collect(),
            states,
        };
        let mut best = {
            let index = argmin(&costs);
            Best::new(chains.states[index].clone(), sanitise(costs[index]))
        };
        let mut draws = Draws::new(self.options.samples);
        let mut acceptance_rate = 1.0;
        debug!("sampling with {size} chains, burn-in of {} generations", self.options.burn);

        let mut step = 0;
        let status = loop {
            if step >= self.options.burn {
                draws.push(chains.states.clone(), chains.logp.clone());
            }
            let uncertainty = UncertaintyState {
                generation: step,
                labels: labels.clone(),
                draws: draws.clone(),
                acceptance_rate,
            };
            let generation = Generation::new(step, best.value, best.point.clone())
                .with_population(chains.logp.iter().map(|logp| -logp).collect())
                .with_uncertainty(uncertainty);
            if control.advance(generation).is_break() {
                break FitStatus::Cancelled;
            }
            step += 1;
            if step >= self.options.steps {
                break FitStatus::StepLimit;
            }

            let proposals: Vec<_> = (0..size)
                .map(|chain| self.propose(problem, &chains, chain, step, &mut rand))
                .collect();
            let costs = map.map(&proposals)?;
            let mut accepted = 0;
            for (chain, (proposal, cost)) in proposals.into_iter().zip(costs).enumerate() {
                let cost = sanitise(cost);
                if cost < best.value {
                    best = Best::new(proposal.clone(), cost);
                }
                let logp = log_density(cost);
                let log_u = random_f64(&mut rand).max(f64::MIN_POSITIVE).ln();
                if log_u < logp - chains.logp[chain] {
                    chains.states[chain] = proposal;
                    chains.logp[chain] = logp;
                    accepted += 1;
                }
            }
            acceptance_rate = accepted as f64 / size as f64;
        };

        Ok(Solution { best, status })
    }
}
