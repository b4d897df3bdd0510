//! The model hierarchy.
//!
//! Every model owns a [ModelCore] with its metadata, current parameters, initial value,
//! integrator and last result. The [Model] trait provides the shared lifecycle on top of
//! three family-specific pieces: how resolved parameter values become typed parameters,
//! the derivative and the observable used for fitting.
//!
//! ```ignore
//! let mut model = ClassicModel::sir()?;
//! model.set_params([0.2, 0.1, 1000.0])?;
//! model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
//! model.solve((0.0, 160.0), None)?;
//! let infected = model.extract_series("i")?;
//! ```

mod classic;
mod eulerian;
mod lagrangian;
mod meta;
mod params;
mod series;

use std::{fmt, sync::Arc};

use ndarray::Array2;

pub use classic::{ClassicModel, ClassicParams, Population};
pub use eulerian::{EulerianModel, EulerianParams};
pub use lagrangian::{LagrangianModel, LagrangianParams};
pub use meta::Compartments;
pub use params::{Index, ModelParams, NodeRates, ParamKind, ParamSet, ParamSpec, ParamValue, Slot};
pub use series::Series;

pub(crate) use series::row;

use super::{
    layout::StateLayout,
    solve::{self, Dopri5, Integrator, SolveResult},
    T,
};
use crate::error::{EpiError, ParameterError, SolveError};

/// State shared by every model.
#[derive(Debug, Clone)]
pub struct ModelCore<P> {
    name: String,
    compartments: Compartments,
    specs: Vec<ParamSpec>,
    params: Option<P>,
    t0: T,
    y0: Option<Vec<f64>>,
    result: Option<SolveResult>,
    integrator: Arc<dyn Integrator>,
}

impl<P: ModelParams> ModelCore<P> {
    pub(crate) fn new(
        name: impl Into<String>,
        compartments: Compartments,
        specs: Vec<ParamSpec>,
    ) -> Result<Self, EpiError> {
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(spec.name))
            {
                return Err(ParameterError::DuplicateName {
                    name: spec.name.to_string(),
                }
                .into());
            }
        }
        Ok(Self {
            name: name.into(),
            compartments,
            specs,
            params: None,
            t0: 0.0,
            y0: None,
            result: None,
            integrator: Arc::new(Dopri5::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compartments(&self) -> &Compartments {
        &self.compartments
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn integrator(&self) -> &dyn Integrator {
        self.integrator.as_ref()
    }

    fn summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} model", self.name)?;
        let compartments: Vec<String> = self
            .compartments
            .names()
            .iter()
            .zip(self.compartments.codes())
            .map(|(name, code)| format!("{} ({})", name, code))
            .collect();
        writeln!(f, "  compartments: {}", compartments.join(", "))?;
        match &self.params {
            Some(params) => {
                let entries: Vec<String> = params
                    .entries()
                    .iter()
                    .map(|(name, value)| format!("{} = {}", name, value))
                    .collect();
                writeln!(f, "  parameters: {}", entries.join(", "))?;
            }
            None => {
                let names: Vec<&str> = self.specs.iter().map(|s| s.name).collect();
                writeln!(f, "  parameters: {} (not set)", names.join(", "))?;
            }
        }
        match &self.y0 {
            Some(y0) => writeln!(f, "  initial value: t0 = {}, y0 = {:?}", self.t0, y0)?,
            None => writeln!(f, "  initial value: not set")?,
        }
        match &self.result {
            Some(result) => write!(f, "  solved: {} time points", result.len()),
            None => write!(f, "  solved: no"),
        }
    }
}

/// A compartmental model.
///
/// Implementors supply the family-specific parts; parameter handling, solving and
/// extraction are shared. [Model::simulate] is pure and may be called from many threads
/// at once with different parameters, [Model::solve] stores its result on the model.
pub trait Model: Send + Sync {
    type Params: ModelParams;

    fn core(&self) -> &ModelCore<Self::Params>;

    fn core_mut(&mut self) -> &mut ModelCore<Self::Params>;

    fn layout(&self) -> StateLayout;

    /// Builds typed parameters from values already checked against the declared parameters.
    fn build_params(&self, values: Vec<ParamValue>) -> Self::Params;

    /// Writes `dy/dt` at `(t, y)` into `dy`.
    fn derivative(
        &self,
        params: &Self::Params,
        t: T,
        y: &[f64],
        dy: &mut [f64],
    ) -> Result<(), EpiError>;

    /// The observed quantity of a solved trajectory, one row per time point.
    ///
    /// For disease models this is the incidence, for pure movement models the number of
    /// people present at each node.
    fn observable(
        &self,
        params: &Self::Params,
        result: &SolveResult,
    ) -> Result<Array2<f64>, EpiError>;

    /// Parameter slots fitted when no targets are configured.
    fn default_targets(&self) -> Vec<Slot>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn compartments(&self) -> &Compartments {
        self.core().compartments()
    }

    fn param_names(&self) -> Vec<&'static str> {
        self.core().specs().iter().map(|s| s.name).collect()
    }

    fn nodes(&self) -> usize {
        self.layout().nodes()
    }

    /// Validates a parameter assignment without touching the model.
    fn parse_params(&self, set: impl Into<ParamSet>) -> Result<Self::Params, EpiError>
    where
        Self: Sized,
    {
        let values = params::resolve(self.core().specs(), self.nodes(), set.into())?;
        Ok(self.build_params(values))
    }

    /// Assigns parameters. On error the model is left without valid parameters.
    fn set_params(&mut self, set: impl Into<ParamSet>) -> Result<(), EpiError>
    where
        Self: Sized,
    {
        let parsed = self.parse_params(set);
        let core = self.core_mut();
        match parsed {
            Ok(params) => {
                core.params = Some(params);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(model = core.name.as_str(), %err, "rejected parameters");
                core.params = None;
                Err(err)
            }
        }
    }

    fn params(&self) -> Result<&Self::Params, EpiError> {
        self.core()
            .params
            .as_ref()
            .ok_or_else(|| EpiError::InvalidParameters {
                model: self.name().to_string(),
            })
    }

    fn has_valid_params(&self) -> bool {
        self.core().params.is_some()
    }

    /// Stores the initial time and state. The length is checked when solving.
    fn set_initial_value(&mut self, t0: T, y0: impl Into<Vec<f64>>)
    where
        Self: Sized,
    {
        let core = self.core_mut();
        core.t0 = t0;
        core.y0 = Some(y0.into());
    }

    fn initial_value(&self) -> Option<(T, &[f64])> {
        let core = self.core();
        core.y0.as_deref().map(|y0| (core.t0, y0))
    }

    fn set_integrator(&mut self, integrator: impl Integrator + 'static)
    where
        Self: Sized,
    {
        self.core_mut().integrator = Arc::new(integrator);
    }

    /// `dy/dt` at `(t, y)` with the current parameters.
    fn evaluate_rhs(&self, t: T, y: &[f64]) -> Result<Vec<f64>, EpiError> {
        let params = self.params()?;
        self.check_state(y)?;
        let mut dy = vec![0.0; y.len()];
        self.derivative(params, t, y, &mut dy)?;
        Ok(dy)
    }

    /// Integrates the model from its initial value with the given parameters, over
    /// `t_span` starting at the stored initial state.
    fn simulate(
        &self,
        params: &Self::Params,
        t_span: (T, T),
        eval_times: Option<&[f64]>,
    ) -> Result<SolveResult, EpiError> {
        let core = self.core();
        let y0 = core
            .y0
            .as_deref()
            .ok_or_else(|| EpiError::MissingInitialValue {
                model: core.name.clone(),
            })?;
        self.check_state(y0)?;
        let rhs = |t: T, y: &[f64], dy: &mut [f64]| self.derivative(params, t, y, dy);
        solve::solve(
            &core.name,
            core.integrator.as_ref(),
            &rhs,
            t_span,
            y0,
            eval_times,
        )
    }

    /// Solves with the current parameters and stores the result.
    ///
    /// Fails without integrating if the parameters are not valid. Any failure clears the
    /// previous result.
    fn solve(&mut self, t_span: (T, T), eval_times: Option<&[f64]>) -> Result<&SolveResult, EpiError>
    where
        Self: Sized,
    {
        let outcome = self
            .params()
            .and_then(|params| self.simulate(params, t_span, eval_times));
        let core = self.core_mut();
        match outcome {
            Ok(result) => Ok(core.result.insert(result)),
            Err(err) => {
                core.result = None;
                Err(err)
            }
        }
    }

    fn result(&self) -> Result<&SolveResult, EpiError> {
        self.core()
            .result
            .as_ref()
            .ok_or_else(|| EpiError::NotSolved {
                model: self.name().to_string(),
            })
    }

    /// Time series of the last result.
    ///
    /// `mode` is `all`, a compartment name or code, `<code>-all` for one series per node
    /// or `<code>-<node>` with 1-based node numbers.
    fn extract_series(&self, mode: &str) -> Result<Series, EpiError> {
        series::extract(self.compartments(), &self.layout(), self.result()?, mode)
    }

    #[doc(hidden)]
    fn check_state(&self, y: &[f64]) -> Result<(), EpiError> {
        let expected = self.layout().len();
        if y.len() != expected {
            return Err(EpiError::Solve {
                model: self.name().to_string(),
                cause: SolveError::StateLength {
                    expected,
                    found: y.len(),
                },
            });
        }
        Ok(())
    }
}

/// Implements [fmt::Display] as the model summary.
macro_rules! impl_summary {
    ($model:ty) => {
        impl std::fmt::Display for $model {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.core.summary(f)
            }
        }
    };
}
pub(crate) use impl_summary;
