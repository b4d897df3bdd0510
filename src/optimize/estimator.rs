use std::fmt;

use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::{fitness::Fitness, global, least_squares, Search};
use crate::{
    error::{EpiError, ParameterError},
    simulator::{Model, ModelParams, Slot},
};

/// Multiplicative noise on the reference observable: every sample `c` becomes
/// `c * (1 + u)` with `u` drawn uniformly from `[-ratio, ratio]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Noise {
    pub ratio: f64,
    /// Fixed seed for reproducible draws, fresh entropy otherwise.
    pub seed: Option<u64>,
}

impl Noise {
    pub fn new(ratio: f64) -> Self {
        Self { ratio, seed: None }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn apply(&self, observed: &mut Array2<f64>) -> Result<(), EpiError> {
        if !(self.ratio.is_finite() && self.ratio >= 0.0) {
            return Err(EpiError::Optimizer(format!(
                "noise ratio must be finite and non-negative, got {}",
                self.ratio
            )));
        }
        let uniform = Uniform::new_inclusive(-self.ratio, self.ratio)
            .map_err(|e| EpiError::Optimizer(e.to_string()))?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        observed.mapv_inplace(|c| c * (1.0 + uniform.sample(&mut rng)));
        Ok(())
    }
}

/// Settings of an estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// The reference is sampled at `0, 1, ..., horizon`.
    pub horizon: usize,
    /// Parameter slots to fit, the model's defaults when `None`.
    pub targets: Option<Vec<Slot>>,
    /// Search box per target, `(0, 1)` for each when `None`.
    pub bounds: Option<Vec<(f64, f64)>>,
    pub noise: Option<Noise>,
    /// Stop the global search once the best fitness drops to this value.
    pub target_tolerance: Option<f64>,
    pub max_iters: u64,
    pub particles: usize,
    /// Refine the global optimum with Nelder-Mead.
    pub polish: bool,
    pub polish_iters: u64,
    /// Evaluate candidates on the rayon thread pool.
    pub parallel: bool,
    pub lsq_tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            horizon: 100,
            targets: None,
            bounds: None,
            noise: None,
            target_tolerance: Some(0.1),
            max_iters: 100,
            particles: 40,
            polish: true,
            polish_iters: 200,
            parallel: false,
            lsq_tolerance: 1e-10,
        }
    }
}

impl EstimatorConfig {
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = Slot>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_noise(mut self, noise: Noise) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn with_target_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.target_tolerance = tolerance;
        self
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_particles(mut self, particles: usize) -> Self {
        self.particles = particles;
        self
    }

    pub fn with_polish(mut self, polish: bool) -> Self {
        self.polish = polish;
        self
    }

    pub fn with_polish_iters(mut self, polish_iters: u64) -> Self {
        self.polish_iters = polish_iters;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_lsq_tolerance(mut self, tolerance: f64) -> Self {
        self.lsq_tolerance = tolerance;
        self
    }
}

/// Result of an estimation run.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate<P> {
    pub slots: Vec<Slot>,
    pub values: Vec<f64>,
    /// The model parameters with the fitted values filled in.
    pub params: P,
    /// Mean squared error of the observable at `values`.
    pub fitness: f64,
    pub iterations: u64,
    pub termination: String,
    pub converged: bool,
}

impl<P> Estimate<P> {
    /// Fitted value of a slot such as `beta` or `beta[1]`.
    pub fn value(&self, slot: &str) -> Option<f64> {
        let slot = Slot::parse(slot).ok()?;
        self.slots
            .iter()
            .position(|s| *s == slot)
            .map(|i| self.values[i])
    }
}

impl<P> fmt::Display for Estimate<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fitness: {:e}", self.fitness)?;
        writeln!(f, "iterations: {}", self.iterations)?;
        writeln!(f, "termination: {}", self.termination)?;
        write!(f, "converged: {}", self.converged)?;
        for (slot, value) in self.slots.iter().zip(&self.values) {
            write!(f, "\n  {} = {}", slot, value)?;
        }
        Ok(())
    }
}

/// Recovers parameters of a model from its own simulated observable.
///
/// The model is only borrowed: its parameters and stored result are never changed.
pub struct Estimator<'a, M: Model> {
    model: &'a M,
    config: EstimatorConfig,
}

impl<'a, M: Model> Estimator<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self::with_config(model, EstimatorConfig::default())
    }

    pub fn with_config(model: &'a M, config: EstimatorConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    fn targets(&self, params: &M::Params) -> Result<Vec<Slot>, EpiError> {
        let targets = match &self.config.targets {
            Some(targets) => targets.clone(),
            None => self.model.default_targets(),
        };
        if let Some(missing) = targets.iter().find(|slot| params.slot(slot).is_none()) {
            return Err(ParameterError::UnknownKey {
                name: missing.to_string(),
            }
            .into());
        }
        Ok(targets)
    }

    fn bounds(&self, dimensions: usize) -> Result<Vec<(f64, f64)>, EpiError> {
        let bounds = match &self.config.bounds {
            Some(bounds) => bounds.clone(),
            None => vec![(0.0, 1.0); dimensions],
        };
        if bounds.len() != dimensions {
            return Err(ParameterError::CountMismatch {
                expected: dimensions,
                found: bounds.len(),
            }
            .into());
        }
        if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| !(lo <= hi)) {
            return Err(EpiError::Optimizer(format!("empty bound ({}, {})", lo, hi)));
        }
        Ok(bounds)
    }

    /// The reference observable: the model solved at its current parameters on
    /// `0, 1, ..., horizon`, with noise applied when configured.
    pub fn reference(&self) -> Result<Array2<f64>, EpiError> {
        let params = self.model.params()?;
        let grid = self.grid();
        let horizon = self.config.horizon as f64;
        let result = self.model.simulate(params, (0.0, horizon), Some(&grid))?;
        let mut observed = self.model.observable(params, &result)?;
        if let Some(noise) = &self.config.noise {
            noise.apply(&mut observed)?;
        }
        Ok(observed)
    }

    fn grid(&self) -> Vec<f64> {
        (0..=self.config.horizon).map(|t| t as f64).collect()
    }

    fn fitness(&self) -> Result<Fitness<'a, M>, EpiError> {
        let base = self.model.params()?.clone();
        let slots = self.targets(&base)?;
        let observed = self.reference()?;
        Ok(Fitness::new(
            self.model,
            base,
            slots,
            self.grid(),
            observed,
            self.config.parallel,
        ))
    }

    /// Global search over the bounds, polished with Nelder-Mead when configured.
    pub fn estimate(&self) -> Result<Estimate<M::Params>, EpiError> {
        let fitness = self.fitness()?;
        let bounds = self.bounds(fitness.dimensions())?;
        tracing::info!(
            model = self.model.name(),
            targets = fitness.dimensions(),
            particles = self.config.particles,
            "starting global search"
        );
        let mut search = global::particle_swarm(
            &fitness,
            &bounds,
            self.config.particles,
            self.config.max_iters,
            self.config.target_tolerance,
        )?;
        tracing::debug!(fitness = search.fitness, iterations = search.iterations, "particle swarm finished");

        if self.config.polish {
            let polished = global::polish(&fitness, &bounds, &search.params, self.config.polish_iters)?;
            tracing::debug!(fitness = polished.fitness, "polish finished");
            if polished.fitness <= search.fitness {
                search = Search {
                    iterations: search.iterations + polished.iterations,
                    converged: search.converged || polished.converged,
                    ..polished
                };
            }
        }
        self.finish(&fitness, search)
    }

    /// Levenberg-Marquardt on the residual vector, starting from `initial_guess`.
    pub fn least_squares(&self, initial_guess: &[f64]) -> Result<Estimate<M::Params>, EpiError> {
        let fitness = self.fitness()?;
        if initial_guess.len() != fitness.dimensions() {
            return Err(ParameterError::CountMismatch {
                expected: fitness.dimensions(),
                found: initial_guess.len(),
            }
            .into());
        }
        tracing::info!(
            model = self.model.name(),
            targets = fitness.dimensions(),
            "starting least squares"
        );
        let search =
            least_squares::levenberg_marquardt(&fitness, initial_guess, self.config.lsq_tolerance)?;
        self.finish(&fitness, search)
    }

    fn finish(&self, fitness: &Fitness<'_, M>, search: Search) -> Result<Estimate<M::Params>, EpiError> {
        tracing::info!(
            model = self.model.name(),
            fitness = search.fitness,
            iterations = search.iterations,
            termination = search.termination.as_str(),
            "estimation finished"
        );
        Ok(Estimate {
            slots: fitness.slots().to_vec(),
            params: fitness.params_at(&search.params)?,
            values: search.params,
            fitness: search.fitness,
            iterations: search.iterations,
            termination: search.termination,
            converged: search.converged,
        })
    }
}
