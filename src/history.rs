//! The bounded record of fit progress that algorithms produce and monitors consume.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};


/// Posterior sample state of an ensemble sampler. Shared between events without copying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyState {
    pub generation: u64,
    pub labels: Vec<String>,
    pub draws: Draws,
    pub acceptance_rate: f64,
}

impl UncertaintyState {
    pub fn mean(&self) -> Vec<f64> {
        let dim = self.labels.len();
        let mut mean = vec![0.0; dim];
        if self.draws.is_empty() {
            return mean;
        }
        for draw in self.draws.points() {
            for (sum, value) in mean.iter_mut().zip(draw) {
                *sum += value;
            }
        }
        let count = self.draws.len() as f64;
        mean.iter_mut().for_each(|sum| *sum /= count);
        mean
    }

    pub fn stdev(&self) -> Vec<f64> {
        let mean = self.mean();
        let mut var = vec![0.0; mean.len()];
        if self.draws.len() < 2 {
            return var;
        }
        for draw in self.draws.points() {
            for ((sum, value), mean) in var.iter_mut().zip(draw).zip(&mean) {
                *sum += (value - mean).powi(2);
            }
        }
        let count = (self.draws.len() - 1) as f64;
        var.iter().map(|sum| (sum / count).sqrt()).collect()
    }
}

#[derive(Debug)]
struct DrawChunk {
    points: Vec<Vec<f64>>,
    logp: Vec<f64>,
}

/// A bounded store of sampler draws, oldest first, kept as shared chunks of one generation each.
/// Cloning copies chunk handles, never the draws themselves, so successive states share
/// storage. Once `capacity` is exceeded the oldest draws are evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "DrawsRepr", from = "DrawsRepr")]
pub struct Draws {
    capacity: usize,
    chunks: VecDeque<Arc<DrawChunk>>,
    /// Draws of the front chunk already evicted.
    skip: usize,
    len: usize,
}

impl Draws {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chunks: VecDeque::new(),
            skip: 0,
            len: 0,
        }
    }

    /// A store holding exactly the given draws.
    pub fn from_samples(points: Vec<Vec<f64>>, logp: Vec<f64>) -> Self {
        let mut draws = Self::new(points.len());
        draws.push(points, logp);
        draws
    }

    /// Appends one generation of draws, evicting the oldest beyond capacity. `logp` holds the
    /// log-density of each point.
    pub fn push(&mut self, points: Vec<Vec<f64>>, logp: Vec<f64>) {
        debug_assert_eq!(points.len(), logp.len());
        if points.is_empty() {
            return;
        }
        self.len += points.len();
        self.chunks.push_back(Arc::new(DrawChunk { points, logp }));
        while self.len > self.capacity {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let remaining = front.points.len() - self.skip;
            let excess = self.len - self.capacity;
            if excess >= remaining {
                self.chunks.pop_front();
                self.skip = 0;
                self.len -= remaining;
            } else {
                self.skip += excess;
                self.len -= excess;
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Retained points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        self.chunks
            .iter()
            .enumerate()
            .flat_map(move |(index, chunk)| {
                let skip = if index == 0 { self.skip } else { 0 };
                chunk.points[skip..].iter().map(Vec::as_slice)
            })
    }

    /// Log-density of each retained point, in the order of [Draws::points].
    pub fn logp(&self) -> impl Iterator<Item = f64> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .flat_map(move |(index, chunk)| {
                let skip = if index == 0 { self.skip } else { 0 };
                chunk.logp[skip..].iter().copied()
            })
    }

    /// Whether both stores hold the very same oldest chunk.
    #[cfg(test)]
    pub(crate) fn shares_storage(&self, other: &Draws) -> bool {
        match (self.chunks.front(), other.chunks.front()) {
            (Some(ours), Some(theirs)) => Arc::ptr_eq(ours, theirs),
            _ => false,
        }
    }
}

/// Stores are equal when they hold the same draws, however those are chunked.
impl PartialEq for Draws {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.points().eq(other.points())
            && self.logp().eq(other.logp())
    }
}

#[derive(Serialize, Deserialize)]
struct DrawsRepr {
    points: Vec<Vec<f64>>,
    logp: Vec<f64>,
}

impl From<Draws> for DrawsRepr {
    fn from(draws: Draws) -> Self {
        Self {
            points: draws.points().map(<[f64]>::to_vec).collect(),
            logp: draws.logp().collect(),
        }
    }
}

impl From<DrawsRepr> for Draws {
    fn from(repr: DrawsRepr) -> Self {
        Draws::from_samples(repr.points, repr.logp)
    }
}

/// What an algorithm reports at the end of each iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub step: u64,
    /// Best value seen so far.
    pub value: f64,
    /// Point at which `value` was attained.
    pub point: Vec<f64>,
    /// Costs of the current population, for population-based algorithms.
    pub population: Option<Vec<f64>>,
    pub uncertainty: Option<UncertaintyState>,
}

impl Generation {
    pub fn new(step: u64, value: f64, point: Vec<f64>) -> Self {
        Self {
            step,
            value,
            point,
            population: None,
            uncertainty: None,
        }
    }

    pub fn with_population(mut self, population: Vec<f64>) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_uncertainty(mut self, uncertainty: UncertaintyState) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn into_record(self, elapsed: Duration) -> Record {
        Record {
            step: self.step,
            value: self.value,
            point: self.point.into(),
            elapsed,
            population: self.population.map(Into::into),
            uncertainty: self.uncertainty.map(Arc::new),
        }
    }
}

/// One immutable entry of the history. Cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub step: u64,
    pub value: f64,
    pub point: Arc<[f64]>,
    /// Time since the start of the run.
    pub elapsed: Duration,
    pub population: Option<Arc<[f64]>>,
    pub uncertainty: Option<Arc<UncertaintyState>>,
}

/// The history window requested by the monitors of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    window: usize,
}

impl Default for Requirements {
    fn default() -> Self {
        Self { window: 1 }
    }
}

impl Requirements {
    /// Requests that at least `window` of the most recent records be retained.
    pub fn requires(&mut self, window: usize) {
        self.window = self.window.max(window);
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

#[derive(Debug, Clone)]
pub struct History {
    window: usize,
    records: VecDeque<Record>,
}

impl History {
    pub fn new(requirements: &Requirements) -> Self {
        Self {
            window: requirements.window,
            records: VecDeque::with_capacity(requirements.window),
        }
    }

    /// Appends a record, evicting the oldest once the window is full.
    pub fn push(&mut self, record: Record) {
        if self.records.len() == self.window {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn latest(&self) -> Option<&Record> {
        self.records.back()
    }

    /// Retained records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
