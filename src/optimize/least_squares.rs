use std::cell::RefCell;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rayon::prelude::*;

use super::{fitness::Fitness, Search};
use crate::{error::EpiError, simulator::Model};

/// Relative forward-difference step.
const STEP: f64 = 1.5e-8;

/// Residuals of a [Fitness] as a least-squares problem.
///
/// The solver cannot receive errors, so the first one is kept in `failure` and
/// reported after the run.
struct Residuals<'f, 'a, M: Model> {
    fitness: &'f Fitness<'a, M>,
    x: DVector<f64>,
    failure: RefCell<Option<EpiError>>,
}

impl<M: Model> Residuals<'_, '_, M> {
    fn park<T>(&self, outcome: Result<T, EpiError>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(err) => {
                self.failure.borrow_mut().get_or_insert(err);
                None
            }
        }
    }

    fn forward_difference(&self) -> Result<DMatrix<f64>, EpiError> {
        let fitness = self.fitness;
        let base = self.x.as_slice();
        let r0 = fitness.residuals(base)?;
        let columns: Vec<Vec<f64>> = if fitness.parallel() {
            (0..base.len())
                .into_par_iter()
                .map(|j| column(fitness, base, &r0, j))
                .collect::<Result<_, _>>()?
        } else {
            (0..base.len())
                .map(|j| column(fitness, base, &r0, j))
                .collect::<Result<_, _>>()?
        };
        Ok(DMatrix::from_fn(r0.len(), base.len(), |i, j| columns[j][i]))
    }
}

/// Column `j` of the Jacobian at `base`, where the residuals are `r0`.
fn column<M: Model>(
    fitness: &Fitness<'_, M>,
    base: &[f64],
    r0: &[f64],
    j: usize,
) -> Result<Vec<f64>, EpiError> {
    let h = STEP * base[j].abs().max(1.0);
    let mut x = base.to_vec();
    x[j] += h;
    let r = fitness.residuals(&x)?;
    Ok(r.iter().zip(r0).map(|(r, r0)| (r - r0) / h).collect())
}

impl<M: Model> LeastSquaresProblem<f64, Dyn, Dyn> for Residuals<'_, '_, M> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.x.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let residuals = self.park(self.fitness.residuals(self.x.as_slice()))?;
        Some(DVector::from_vec(residuals))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.park(self.forward_difference())
    }
}

/// Levenberg-Marquardt from `initial_guess`, stopping at relative tolerance `tolerance`.
pub(crate) fn levenberg_marquardt<M: Model>(
    fitness: &Fitness<'_, M>,
    initial_guess: &[f64],
    tolerance: f64,
) -> Result<Search, EpiError> {
    let problem = Residuals {
        fitness,
        x: DVector::from_column_slice(initial_guess),
        failure: RefCell::new(None),
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_ftol(tolerance)
        .with_xtol(tolerance)
        .with_gtol(tolerance)
        .minimize(problem);
    if let Some(err) = problem.failure.into_inner() {
        return Err(err);
    }
    tracing::debug!(
        evaluations = report.number_of_evaluations,
        termination = ?report.termination,
        "levenberg-marquardt finished"
    );
    let samples = fitness.samples().max(1) as f64;
    Ok(Search {
        params: problem.x.as_slice().to_vec(),
        // the objective is half the sum of squares
        fitness: 2.0 * report.objective_function / samples,
        iterations: report.number_of_evaluations as u64,
        termination: format!("{:?}", report.termination),
        converged: report.termination.was_successful(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{ClassicModel, Model};
    use approx::assert_relative_eq;

    #[test]
    fn jacobian_matches_a_central_difference() {
        let mut model = ClassicModel::sir().unwrap();
        model.set_params([0.3, 0.1, 1000.0]).unwrap();
        model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
        let base = model.params().unwrap().clone();
        let grid: Vec<f64> = (0..=10).map(|t| t as f64).collect();
        let result = model.simulate(&base, (0.0, 10.0), Some(&grid)).unwrap();
        let observed = model.observable(&base, &result).unwrap();
        let fitness = Fitness::new(&model, base, model.default_targets(), grid, observed, true);

        let problem = Residuals {
            fitness: &fitness,
            x: DVector::from_vec(vec![0.3, 0.1]),
            failure: RefCell::new(None),
        };
        let jacobian = problem.jacobian().unwrap();
        assert_eq!(jacobian.shape(), (11, 2));

        let h = 1e-5;
        let plus = fitness.residuals(&[0.3 + h, 0.1]).unwrap();
        let minus = fitness.residuals(&[0.3 - h, 0.1]).unwrap();
        let central = (plus[10] - minus[10]) / (2.0 * h);
        assert_relative_eq!(jacobian[(10, 0)], central, max_relative = 1e-2);
    }
}
