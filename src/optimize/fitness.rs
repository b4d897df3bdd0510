use ndarray::Array2;

use crate::{
    error::EpiError,
    simulator::{Model, ModelParams, Slot},
};

/// Mismatch between a reference observable and the observable predicted at a candidate.
///
/// A candidate is a vector of values for `slots`, the remaining parameters are taken from
/// `base`. Every evaluation is one forward solve on the unit grid `0, 1, ..., n` plus one
/// extraction, with no state shared between evaluations.
pub(crate) struct Fitness<'a, M: Model> {
    model: &'a M,
    base: M::Params,
    slots: Vec<Slot>,
    grid: Vec<f64>,
    observed: Array2<f64>,
    parallel: bool,
}

impl<'a, M: Model> Fitness<'a, M> {
    pub(crate) fn new(
        model: &'a M,
        base: M::Params,
        slots: Vec<Slot>,
        grid: Vec<f64>,
        observed: Array2<f64>,
        parallel: bool,
    ) -> Self {
        Self {
            model,
            base,
            slots,
            grid,
            observed,
            parallel,
        }
    }

    pub(crate) fn dimensions(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn samples(&self) -> usize {
        self.observed.len()
    }

    pub(crate) fn parallel(&self) -> bool {
        self.parallel
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The full parameters at a candidate.
    pub(crate) fn params_at(&self, x: &[f64]) -> Result<M::Params, EpiError> {
        Ok(self.base.with_slots(&self.slots, x)?)
    }

    fn predict(&self, x: &[f64]) -> Result<Array2<f64>, EpiError> {
        let params = self.params_at(x)?;
        let horizon = self.grid.last().copied().unwrap_or_default();
        let result = self.model.simulate(&params, (0.0, horizon), Some(&self.grid))?;
        let predicted = self.model.observable(&params, &result)?;
        if predicted.dim() != self.observed.dim() {
            return Err(EpiError::Optimizer(format!(
                "candidate observable has shape {:?}, reference has {:?}",
                predicted.dim(),
                self.observed.dim()
            )));
        }
        Ok(predicted)
    }

    /// Mean squared error over every time point and series.
    pub(crate) fn mse(&self, x: &[f64]) -> Result<f64, EpiError> {
        let predicted = self.predict(x)?;
        let sum: f64 = self
            .observed
            .iter()
            .zip(predicted.iter())
            .map(|(o, p)| (o - p).powi(2))
            .sum();
        let mse = sum / self.samples().max(1) as f64;
        tracing::trace!(candidate = ?x, mse, "fitness");
        Ok(mse)
    }

    /// `observed - predicted`, flattened time-major.
    pub(crate) fn residuals(&self, x: &[f64]) -> Result<Vec<f64>, EpiError> {
        let predicted = self.predict(x)?;
        Ok(self
            .observed
            .iter()
            .zip(predicted.iter())
            .map(|(o, p)| o - p)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::ClassicModel;

    fn fitness(model: &ClassicModel) -> Fitness<'_, ClassicModel> {
        let base = model.params().unwrap().clone();
        let grid: Vec<f64> = (0..=30).map(|t| t as f64).collect();
        let result = model.simulate(&base, (0.0, 30.0), Some(&grid)).unwrap();
        let observed = model.observable(&base, &result).unwrap();
        Fitness::new(
            model,
            base,
            model.default_targets(),
            grid,
            observed,
            false,
        )
    }

    fn sir() -> ClassicModel {
        let mut model = ClassicModel::sir().unwrap();
        model.set_params([0.3, 0.1, 1000.0]).unwrap();
        model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
        model
    }

    #[test]
    fn zero_at_the_reference_parameters() {
        let model = sir();
        let fitness = fitness(&model);
        assert_eq!(fitness.mse(&[0.3, 0.1]).unwrap(), 0.0);
        assert!(fitness.residuals(&[0.3, 0.1]).unwrap().iter().all(|r| *r == 0.0));
        assert_eq!(fitness.residuals(&[0.3, 0.1]).unwrap().len(), 31);
    }

    #[test]
    fn positive_elsewhere() {
        let model = sir();
        let fitness = fitness(&model);
        assert!(fitness.mse(&[0.25, 0.1]).unwrap() > 0.0);
        assert!(fitness.mse(&[0.3, 0.15]).unwrap() > 0.0);
    }

    #[test]
    fn wrong_candidate_length_is_an_error() {
        let model = sir();
        let fitness = fitness(&model);
        assert!(matches!(
            fitness.mse(&[0.3]),
            Err(EpiError::Parameter(_))
        ));
    }
}
