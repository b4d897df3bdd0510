use argmin::{
    core::{CostFunction, Error, Executor, State, TerminationReason},
    solver::{neldermead::NelderMead, particleswarm::ParticleSwarm},
};

use super::{fitness::Fitness, Search};
use crate::{error::EpiError, simulator::Model};

/// Converts an error coming out of argmin back into an [EpiError].
///
/// Errors raised by the fitness function travel through argmin as [Error] and are
/// recovered unchanged.
pub(crate) fn recover(err: Error) -> EpiError {
    match err.downcast::<EpiError>() {
        Ok(err) => err,
        Err(err) => EpiError::Optimizer(err.to_string()),
    }
}

fn converged(reason: Option<&TerminationReason>) -> bool {
    matches!(
        reason,
        Some(TerminationReason::TargetCostReached) | Some(TerminationReason::SolverConverged)
    )
}

/// Particle swarm search over the box `bounds`.
pub(crate) fn particle_swarm<M: Model>(
    fitness: &Fitness<'_, M>,
    bounds: &[(f64, f64)],
    particles: usize,
    max_iters: u64,
    target_cost: Option<f64>,
) -> Result<Search, EpiError> {
    let lower: Vec<f64> = bounds.iter().map(|b| b.0).collect();
    let upper: Vec<f64> = bounds.iter().map(|b| b.1).collect();
    let solver = ParticleSwarm::new((lower, upper), particles);
    let res = Executor::new(Bounded { fitness, bounds }, solver)
        .configure(|state| {
            let state = state.max_iters(max_iters);
            match target_cost {
                Some(target) => state.target_cost(target),
                None => state,
            }
        })
        .run()
        .map_err(recover)?;

    let state = res.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| EpiError::Optimizer("particle swarm returned no particle".to_string()))?;
    Ok(Search {
        params: project(&best.position, bounds),
        fitness: state.get_best_cost(),
        iterations: state.get_iter(),
        termination: format!("{:?}", state.get_termination_status()),
        converged: converged(state.get_termination_reason()),
    })
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
        .collect()
}

/// The fitness restricted to a box: candidates outside are projected onto it.
struct Bounded<'f, 'a, M: Model> {
    fitness: &'f Fitness<'a, M>,
    bounds: &'f [(f64, f64)],
}

impl<M: Model> CostFunction for Bounded<'_, '_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.fitness.mse(&project(x, self.bounds))?)
    }

    fn parallelize(&self) -> bool {
        self.fitness.parallel()
    }
}

/// Nelder-Mead refinement of `start`, kept inside `bounds`.
pub(crate) fn polish<M: Model>(
    fitness: &Fitness<'_, M>,
    bounds: &[(f64, f64)],
    start: &[f64],
    max_iters: u64,
) -> Result<Search, EpiError> {
    let problem = Bounded { fitness, bounds };
    let simplex = create_initial_simplex(start);
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(1e-12)
        .map_err(recover)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(recover)?;

    let state = res.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| EpiError::Optimizer("Nelder-Mead returned no point".to_string()))?;
    Ok(Search {
        params: project(best, bounds),
        fitness: state.get_best_cost(),
        iterations: state.get_iter(),
        termination: format!("{:?}", state.get_termination_status()),
        converged: converged(state.get_termination_reason()),
    })
}

/// Simplex of `initial_point` and one vertex per coordinate, perturbed by 5% (0.00025 for
/// zero components).
fn create_initial_simplex(initial_point: &[f64]) -> Vec<Vec<f64>> {
    let perturbation_percentage = 0.05;
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_vec());
    for i in 0..initial_point.len() {
        let perturbation = if initial_point[i] == 0.0 {
            0.00025
        } else {
            perturbation_percentage * initial_point[i]
        };
        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::ClassicModel;

    #[test]
    fn searches_report_points_inside_the_bounds() {
        let mut model = ClassicModel::sir().unwrap();
        model.set_params([0.3, 0.1, 1000.0]).unwrap();
        model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
        let base = model.params().unwrap().clone();
        let grid: Vec<f64> = (0..=30).map(|t| t as f64).collect();
        let result = model.simulate(&base, (0.0, 30.0), Some(&grid)).unwrap();
        let observed = model.observable(&base, &result).unwrap();
        let fitness = Fitness::new(&model, base, model.default_targets(), grid, observed, false);

        // the true beta lies above the box
        let bounds = [(0.2, 0.25), (0.05, 0.2)];
        let swarm = particle_swarm(&fitness, &bounds, 10, 5, None).unwrap();
        let polished = polish(&fitness, &bounds, &swarm.params, 20).unwrap();
        for search in [swarm, polished] {
            assert_eq!(search.params.len(), 2);
            for (x, (lo, hi)) in search.params.iter().zip(bounds) {
                assert!(lo <= *x && *x <= hi, "{} outside ({}, {})", x, lo, hi);
            }
            assert!(search.fitness.is_finite() && search.fitness > 0.0);
        }
    }

    #[test]
    fn simplex_has_one_vertex_per_dimension() {
        let simplex = create_initial_simplex(&[0.2, 0.0]);
        assert_eq!(simplex.len(), 3);
        assert_eq!(simplex[0], vec![0.2, 0.0]);
        assert_eq!(simplex[1], vec![0.2 + 0.05 * 0.2, 0.0]);
        assert_eq!(simplex[2], vec![0.2, 0.00025]);
    }

    #[test]
    fn foreign_errors_become_optimizer_errors() {
        let err = recover(Error::msg("boom"));
        assert_eq!(err, EpiError::Optimizer("boom".to_string()));
        let err = recover(Error::new(EpiError::NotSolved {
            model: "SIR".to_string(),
        }));
        assert!(matches!(err, EpiError::NotSolved { .. }));
    }
}
