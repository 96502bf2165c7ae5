//! Batch evaluation of candidate points, either in-process or on a fixed worker pool.
//!
//! Algorithms never call the objective directly; they hand a batch of points to a [Map] and
//! receive one cost per point, in input order. Swapping a [SerialMap] for a [ParallelMap]
//! changes wall-clock behaviour only.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{panic_message, MapError, MapperError};
use crate::problem::{Objective, Problem};


/// Evaluates batches of points against a started objective.
pub trait Map: Send {
    /// Returns exactly one cost per point, in input order. A failure anywhere in the batch
    /// fails the whole batch.
    fn map(&mut self, points: &[Vec<f64>]) -> Result<Vec<f64>, MapError>;

    /// Number of batches submitted so far.
    fn batches(&self) -> u64;

    /// Number of points evaluated so far.
    fn evaluations(&self) -> u64;
}

/// Evaluates a single point through `map`.
pub fn map_one(map: &mut dyn Map, point: &[f64]) -> Result<f64, MapError> {
    Ok(map.map(&[point.to_vec()])?[0])
}

/// Selects and starts a [Map] for a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mapper {
    #[default]
    Serial,
    /// A fixed pool of `workers` threads; all available cores when unset.
    Parallel { workers: Option<usize> },
}

impl Mapper {
    pub fn validate(&self) -> Result<(), MapperError> {
        match self {
            Mapper::Parallel { workers: Some(0) } => Err(MapperError::NoWorkers),
            _ => Ok(()),
        }
    }

    pub fn start(&self, problem: &Problem) -> Result<Box<dyn Map>, MapperError> {
        self.validate()?;
        match self {
            Mapper::Serial => Ok(Box::new(SerialMap::start(problem))),
            Mapper::Parallel { workers } => {
                let workers = workers.unwrap_or_else(default_workers);
                Ok(Box::new(ParallelMap::start(problem, workers)?))
            }
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn check_dims(points: &[Vec<f64>], dim: usize) -> Result<(), MapError> {
    for (index, point) in points.iter().enumerate() {
        if point.len() != dim {
            return Err(MapError::DimensionMismatch {
                index,
                expected: dim,
                actual: point.len(),
            });
        }
    }
    Ok(())
}

fn evaluate(objective: &dyn Objective, index: usize, point: &[f64]) -> Result<f64, MapError> {
    match panic::catch_unwind(AssertUnwindSafe(|| objective.cost(point))) {
        Ok(Ok(cost)) => Ok(cost),
        Ok(Err(source)) => Err(MapError::Cost { index, source }),
        Err(payload) => Err(MapError::WorkerPanicked {
            index,
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Evaluates in the calling thread, one point at a time, in input order.
pub struct SerialMap {
    objective: Arc<dyn Objective>,
    dim: usize,
    batches: u64,
    evaluations: u64,
}

impl SerialMap {
    pub fn start(problem: &Problem) -> Self {
        Self {
            objective: problem.objective(),
            dim: problem.dim(),
            batches: 0,
            evaluations: 0,
        }
    }
}

impl Map for SerialMap {
    fn map(&mut self, points: &[Vec<f64>]) -> Result<Vec<f64>, MapError> {
        check_dims(points, self.dim)?;
        self.batches += 1;
        let costs = points
            .iter()
            .enumerate()
            .map(|(index, point)| evaluate(&*self.objective, index, point))
            .collect::<Result<Vec<_>, _>>()?;
        self.evaluations += costs.len() as u64;
        Ok(costs)
    }

    fn batches(&self) -> u64 {
        self.batches
    }

    fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

/// Evaluates each batch on a dedicated, fixed-size pool of worker threads.
pub struct ParallelMap {
    objective: Arc<dyn Objective>,
    dim: usize,
    pool: ThreadPool,
    batches: u64,
    evaluations: u64,
}

impl ParallelMap {
    pub fn start(problem: &Problem, workers: usize) -> Result<Self, MapperError> {
        if workers == 0 {
            return Err(MapperError::NoWorkers);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("refit-worker-{index}"))
            .build()
            .map_err(|err| MapperError::PoolBuild(err.to_string()))?;
        debug!("started parallel map with {workers} workers");
        Ok(Self {
            objective: problem.objective(),
            dim: problem.dim(),
            pool,
            batches: 0,
            evaluations: 0,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Map for ParallelMap {
    fn map(&mut self, points: &[Vec<f64>]) -> Result<Vec<f64>, MapError> {
        check_dims(points, self.dim)?;
        self.batches += 1;
        let objective = &*self.objective;
        let costs = self.pool.install(|| {
            points
                .par_iter()
                .enumerate()
                .map(|(index, point)| evaluate(objective, index, point))
                .collect::<Result<Vec<_>, _>>()
        });
        match costs {
            Ok(costs) => {
                self.evaluations += costs.len() as u64;
                Ok(costs)
            }
            Err(err) => {
                trace!("batch {} failed: {err}", self.batches);
                Err(err)
            }
        }
    }

    fn batches(&self) -> u64 {
        self.batches
    }

    fn evaluations(&self) -> u64 {
        self.evaluations
    }
}
