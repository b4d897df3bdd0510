//! Parameter estimation.
//!
//! An [Estimator] solves a model at its current ("true") parameters, derives the observable
//! from the trajectory and then searches for the parameter values that reproduce it, either
//! globally with a particle swarm (optionally polished by Nelder-Mead) or locally with
//! Levenberg-Marquardt.

mod estimator;
mod fitness;
mod global;
mod least_squares;

pub use estimator::{Estimate, Estimator, EstimatorConfig, Noise};

/// Outcome of one optimizer run, in candidate space.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Search {
    pub params: Vec<f64>,
    pub fitness: f64,
    pub iterations: u64,
    pub termination: String,
    pub converged: bool,
}
