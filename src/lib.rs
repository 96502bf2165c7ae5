//! Asynchronous execution of curve fits: a fit runs on its own background thread against a
//! private snapshot of the problem, evaluating candidate points serially or on a worker pool,
//! and reports its progress to the caller as a stream of immutable events.

pub mod algorithm;
pub mod display;
pub mod driver;
pub mod error;
pub mod event;
pub mod file;
pub mod history;
pub mod mapper;
pub mod monitor;
pub mod options;
pub mod print;
pub mod problem;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

#[doc = include_str!("../README.md")]
#[cfg(doc)]
fn readme() {}
