use std::{
    cell::RefCell,
    time::{Duration, Instant},
};

use ode_solvers::{dop_shared::OutputType, dopri5::Dopri5 as DormandPrince, DVector, System};

use super::{Failure, Integrator, IntegratorOutput, Rhs};
use crate::{error::SolveError, simulator::T};

const RTOL: f64 = 1e-6;
const ATOL: f64 = 1e-8;

// step size control, ode_solvers' defaults
const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const MAX_STEPS: u32 = 100_000;
const STIFFNESS_CHECK: u32 = 1000;

/// Adaptive Dormand–Prince 5(4) Runge–Kutta integrator, the scheme usually called RK45.
#[derive(Debug, Clone, PartialEq)]
pub struct Dopri5 {
    rtol: f64,
    atol: f64,
    deadline: Option<Duration>,
}

impl Default for Dopri5 {
    fn default() -> Self {
        Self {
            rtol: RTOL,
            atol: ATOL,
            deadline: None,
        }
    }
}

impl Dopri5 {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            deadline: None,
        }
    }

    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    /// Abort an integration that takes longer than `deadline` of wall time.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    pub fn atol(&self) -> f64 {
        self.atol
    }

    /// Integrates from `t0` to `tf`. With `dense = Some(dx)` the output is interpolated every
    /// `dx`, otherwise every accepted step is reported, starting with `t0`.
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        rhs: &Rhs<'_>,
        t0: T,
        tf: T,
        dense: Option<T>,
        y0: &[f64],
        failure: &RefCell<Option<Failure>>,
        started: Instant,
    ) -> Result<(Vec<f64>, Vec<DVector<f64>>), Failure> {
        let system = Segment {
            rhs,
            failure,
            deadline: self.deadline.map(|d| started + d),
        };
        let y0 = DVector::from_column_slice(y0);
        let mut stepper = match dense {
            Some(dx) => DormandPrince::new(system, t0, tf, dx, y0, self.rtol, self.atol),
            // the dense loop never advances with a zero increment
            None => DormandPrince::from_param(
                system,
                t0,
                tf,
                0.0,
                y0,
                self.rtol,
                self.atol,
                SAFETY_FACTOR,
                BETA,
                FAC_MIN,
                FAC_MAX,
                tf - t0,
                0.0,
                MAX_STEPS,
                STIFFNESS_CHECK,
                OutputType::Sparse,
            ),
        };
        let stats = stepper.integrate();
        if let Some(failure) = failure.borrow_mut().take() {
            return Err(failure);
        }
        let stats = stats.map_err(|e| Failure::Solver(SolveError::Integrator(e.to_string())))?;
        tracing::trace!(
            evaluations = stats.num_eval,
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            "dopri5 segment"
        );
        Ok((stepper.x_out().clone(), stepper.y_out().clone()))
    }

    /// Dense output on a uniform grid. Returns `None` if the solver's grid does not line up
    /// with `eval_times`.
    fn uniform(
        &self,
        rhs: &Rhs<'_>,
        eval_times: &[f64],
        y0: &[f64],
        failure: &RefCell<Option<Failure>>,
        started: Instant,
    ) -> Result<Option<Vec<Vec<f64>>>, Failure> {
        let (t0, tf) = (eval_times[0], eval_times[eval_times.len() - 1]);
        let dx = (tf - t0) / (eval_times.len() - 1) as f64;
        let (x_out, y_out) = self.run(rhs, t0, tf, Some(dx), y0, failure, started)?;
        let aligned = x_out.len() == eval_times.len()
            && x_out
                .iter()
                .zip(eval_times)
                .all(|(x, t)| (x - t).abs() <= 1e-9 * dx.max(1.0));
        Ok(aligned.then(|| y_out.iter().map(|y| y.as_slice().to_vec()).collect()))
    }

    /// Restarts the integrator between consecutive evaluation times.
    fn piecewise(
        &self,
        rhs: &Rhs<'_>,
        t_start: T,
        eval_times: &[f64],
        y0: &[f64],
        failure: &RefCell<Option<Failure>>,
        started: Instant,
    ) -> Result<Vec<Vec<f64>>, Failure> {
        let mut states = Vec::with_capacity(eval_times.len());
        let mut t = t_start;
        let mut y = y0.to_vec();
        for &next in eval_times {
            if next > t {
                let (_, y_out) = self.run(rhs, t, next, None, &y, failure, started)?;
                if let Some(last) = y_out.last() {
                    y.copy_from_slice(last.as_slice());
                }
                t = next;
            }
            states.push(y.clone());
        }
        Ok(states)
    }

    fn dispatch(
        &self,
        rhs: &Rhs<'_>,
        t_span: (T, T),
        y0: &[f64],
        eval_times: Option<&[f64]>,
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>), Failure> {
        let (t_start, t_end) = t_span;
        if !(t_end >= t_start) {
            return Err(invalid(format!("empty time span ({}, {})", t_start, t_end)));
        }
        let failure = RefCell::new(None);
        let started = Instant::now();

        let Some(eval_times) = eval_times else {
            if t_end == t_start {
                return Ok((vec![t_start], vec![y0.to_vec()]));
            }
            let (mut times, y_out) = self.run(rhs, t_start, t_end, None, y0, &failure, started)?;
            let mut states: Vec<Vec<f64>> = y_out.iter().map(|y| y.as_slice().to_vec()).collect();
            if times.first() != Some(&t_start) {
                times.insert(0, t_start);
                states.insert(0, y0.to_vec());
            }
            return Ok((times, states));
        };

        if eval_times
            .iter()
            .any(|&t| !(t >= t_start && t <= t_end))
        {
            return Err(invalid("evaluation times outside the time span".to_string()));
        }
        if eval_times.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("evaluation times are not sorted".to_string()));
        }
        if eval_times.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // dense output compares |t|, so it only holds for non-negative times
        if is_uniform(eval_times) && eval_times[0] == t_start && t_start >= 0.0 {
            if let Some(states) = self.uniform(rhs, eval_times, y0, &failure, started)? {
                return Ok((eval_times.to_vec(), states));
            }
        }
        let states = self.piecewise(rhs, t_start, eval_times, y0, &failure, started)?;
        Ok((eval_times.to_vec(), states))
    }
}

impl Integrator for Dopri5 {
    fn integrate(
        &self,
        rhs: &Rhs<'_>,
        t_span: (T, T),
        y0: &[f64],
        eval_times: Option<&[f64]>,
    ) -> IntegratorOutput {
        match self.dispatch(rhs, t_span, y0, eval_times) {
            Ok((times, states)) => IntegratorOutput {
                success: true,
                failure: None,
                times,
                states,
            },
            Err(failure) => IntegratorOutput::failed(failure),
        }
    }
}

fn invalid(message: String) -> Failure {
    Failure::Solver(SolveError::Integrator(message))
}

fn is_uniform(times: &[f64]) -> bool {
    if times.len() < 3 {
        return false;
    }
    let dx = times[1] - times[0];
    dx > 0.0
        && times
            .windows(2)
            .all(|w| ((w[1] - w[0]) - dx).abs() <= 1e-12 * dx.max(1.0))
}

/// One integration leg. The right-hand side cannot return errors through
/// [System::system], so the first one is parked in `failure` and the leg is stopped.
struct Segment<'a, 'r> {
    rhs: &'a Rhs<'r>,
    failure: &'a RefCell<Option<Failure>>,
    deadline: Option<Instant>,
}

impl System<f64, DVector<f64>> for Segment<'_, '_> {
    fn system(&self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        if self.failure.borrow().is_some() {
            dy.fill(0.0);
            return;
        }
        let failure = match (self.rhs)(t, y.as_slice(), dy.as_mut_slice()) {
            Err(err) => Some(Failure::Rhs(err)),
            Ok(()) if dy.iter().any(|v| !v.is_finite()) => {
                Some(Failure::Solver(SolveError::NonFinite { time: t }))
            }
            Ok(()) => None,
        };
        if let Some(failure) = failure {
            dy.fill(0.0);
            self.failure.borrow_mut().replace(failure);
        }
    }

    fn solout(&mut self, t: f64, _y: &DVector<f64>, _dy: &DVector<f64>) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline && self.failure.borrow().is_none() {
                self.failure
                    .borrow_mut()
                    .replace(Failure::Solver(SolveError::DeadlineExceeded { time: t }));
            }
        }
        self.failure.borrow().is_some()
    }
}
