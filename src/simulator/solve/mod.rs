//! Glue between models and the numerical integrator.

mod dopri5;

pub use dopri5::Dopri5;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::{
    error::{EpiError, SolveError},
    simulator::T,
};

/// The derivative function handed to an integrator, `rhs(t, y, dy)`.
pub type Rhs<'a> = dyn Fn(T, &[f64], &mut [f64]) -> Result<(), EpiError> + Sync + 'a;

/// Why an integration stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The right-hand side itself returned an error.
    Rhs(EpiError),
    /// The integrator gave up.
    Solver(SolveError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Rhs(e) => write!(f, "{}", e),
            Failure::Solver(e) => write!(f, "{}", e),
        }
    }
}

/// What an integrator reports back: a success flag, the failure if any, and the
/// sampled trajectory.
#[derive(Debug, Clone)]
pub struct IntegratorOutput {
    pub success: bool,
    pub failure: Option<Failure>,
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl IntegratorOutput {
    pub(crate) fn failed(failure: Failure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            times: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Human readable failure message, as integrators usually report it.
    pub fn message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }
}

/// An adaptive ODE integrator.
///
/// Integrates `dy/dt = rhs(t, y)` over `t_span` from `y0`. When `eval_times` is given, states
/// are reported exactly at those (ascending) times, otherwise at every accepted step
/// starting with `t_span.0`. Failures are reported in the output, never by panicking.
pub trait Integrator: std::fmt::Debug + Send + Sync {
    fn integrate(
        &self,
        rhs: &Rhs<'_>,
        t_span: (T, T),
        y0: &[f64],
        eval_times: Option<&[f64]>,
    ) -> IntegratorOutput;
}

/// A solved trajectory: one row of `states` per entry of `times`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveResult {
    times: Vec<f64>,
    states: Array2<f64>,
    success: bool,
}

impl SolveResult {
    pub(crate) fn new(times: Vec<f64>, states: Array2<f64>) -> Self {
        Self {
            times,
            states,
            success: true,
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// All states, `(times, state length)`.
    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }

    /// State at the `k`-th evaluation time.
    pub fn state(&self, k: usize) -> ArrayView1<'_, f64> {
        self.states.row(k)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn success(&self) -> bool {
        self.success
    }
}

/// Runs `integrator` and converts its report into a [SolveResult] or an [EpiError].
///
/// A domain error raised by the right-hand side is passed through unchanged, any other
/// failure becomes [EpiError::Solve]. Nothing is retried.
pub(crate) fn solve(
    model: &str,
    integrator: &dyn Integrator,
    rhs: &Rhs<'_>,
    t_span: (T, T),
    y0: &[f64],
    eval_times: Option<&[f64]>,
) -> Result<SolveResult, EpiError> {
    tracing::debug!(
        model,
        t0 = t_span.0,
        tf = t_span.1,
        points = eval_times.map(|t| t.len()),
        "solving"
    );
    let output = integrator.integrate(rhs, t_span, y0, eval_times);
    if !output.success {
        let failure = output.failure.unwrap_or_else(|| {
            Failure::Solver(SolveError::Integrator("unknown failure".to_string()))
        });
        tracing::warn!(model, %failure, "integration failed");
        return Err(match failure {
            Failure::Rhs(err @ EpiError::Domain { .. }) => err,
            Failure::Rhs(err) => EpiError::Solve {
                model: model.to_string(),
                cause: SolveError::Integrator(err.to_string()),
            },
            Failure::Solver(cause) => EpiError::Solve {
                model: model.to_string(),
                cause,
            },
        });
    }

    let width = y0.len();
    let mut states = Array2::zeros((output.states.len(), width));
    for (mut row, state) in states.rows_mut().into_iter().zip(output.states.iter()) {
        if state.len() != width {
            return Err(EpiError::Solve {
                model: model.to_string(),
                cause: SolveError::Integrator(format!(
                    "state of length {} returned for an initial value of length {}",
                    state.len(),
                    width
                )),
            });
        }
        row.assign(&ArrayView1::from(state.as_slice()));
    }
    tracing::debug!(model, points = output.times.len(), "solved");
    Ok(SolveResult::new(output.times, states))
}
