use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{
    impl_summary,
    params::{scalar_slot, scalar_value, take_scalar},
    row, Compartments, Model, ModelCore, ModelParams, ParamSpec, ParamValue, Slot,
};
use crate::{
    error::EpiError,
    simulator::{
        kernels::{classic, incidence, Disease},
        layout::StateLayout,
        solve::SolveResult,
        T,
    },
};

/// How the population size entering the force of infection is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Population {
    /// `N` is a parameter, `n`.
    Fixed,
    /// `N` is the current sum of all compartments.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicParams {
    pub beta: f64,
    pub gamma: f64,
    pub sigma: Option<f64>,
    pub population: Option<f64>,
}

impl ModelParams for ClassicParams {
    fn entries(&self) -> Vec<(&'static str, ParamValue)> {
        let mut entries = vec![("beta", self.beta.into()), ("gamma", self.gamma.into())];
        if let Some(sigma) = self.sigma {
            entries.push(("sigma", sigma.into()));
        }
        if let Some(n) = self.population {
            entries.push(("n", n.into()));
        }
        entries
    }

    fn slot(&self, slot: &Slot) -> Option<f64> {
        match slot.name() {
            "beta" => scalar_value(self.beta, slot.index()),
            "gamma" => scalar_value(self.gamma, slot.index()),
            "sigma" => scalar_value(self.sigma?, slot.index()),
            "n" => scalar_value(self.population?, slot.index()),
            _ => None,
        }
    }

    fn slot_mut(&mut self, slot: &Slot) -> Option<&mut f64> {
        match slot.name() {
            "beta" => scalar_slot(&mut self.beta, slot.index()),
            "gamma" => scalar_slot(&mut self.gamma, slot.index()),
            "sigma" => scalar_slot(self.sigma.as_mut()?, slot.index()),
            "n" => scalar_slot(self.population.as_mut()?, slot.index()),
            _ => None,
        }
    }
}

/// A single well-mixed population.
///
/// Parameters, in order: `beta`, `gamma`, then `sigma` for SEIR and `n` when the
/// population is [Population::Fixed].
#[derive(Debug, Clone)]
pub struct ClassicModel {
    core: ModelCore<ClassicParams>,
    disease: Disease,
    population: Population,
}

impl ClassicModel {
    pub fn new(disease: Disease, population: Population) -> Result<Self, EpiError> {
        let compartments = match disease {
            Disease::Sir => Compartments::new(&["Susceptible", "Infected", "Recovered"], &["s", "i", "r"]),
            Disease::Sis => Compartments::new(&["Susceptible", "Infected"], &["s", "i"]),
            Disease::Seir => Compartments::new(
                &["Susceptible", "Exposed", "Infected", "Recovered"],
                &["s", "e", "i", "r"],
            ),
        }?;
        let mut specs = vec![ParamSpec::scalar("beta"), ParamSpec::scalar("gamma")];
        if disease.has_incubation() {
            specs.push(ParamSpec::scalar("sigma"));
        }
        if population == Population::Fixed {
            specs.push(ParamSpec::scalar("n"));
        }
        let name = match population {
            Population::Fixed => disease.label().to_string(),
            Population::Dynamic => format!("{} (dynamic N)", disease.label()),
        };
        Ok(Self {
            core: ModelCore::new(name, compartments, specs)?,
            disease,
            population,
        })
    }

    /// SIR with a fixed population.
    pub fn sir() -> Result<Self, EpiError> {
        Self::new(Disease::Sir, Population::Fixed)
    }

    pub fn sis() -> Result<Self, EpiError> {
        Self::new(Disease::Sis, Population::Fixed)
    }

    pub fn seir() -> Result<Self, EpiError> {
        Self::new(Disease::Seir, Population::Fixed)
    }

    pub fn disease(&self) -> Disease {
        self.disease
    }

    pub fn population(&self) -> Population {
        self.population
    }

    fn population_size(&self, params: &ClassicParams, y: &[f64]) -> f64 {
        params.population.unwrap_or_else(|| y.iter().sum())
    }
}

impl Model for ClassicModel {
    type Params = ClassicParams;

    fn core(&self) -> &ModelCore<ClassicParams> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<ClassicParams> {
        &mut self.core
    }

    fn layout(&self) -> StateLayout {
        StateLayout::single(self.disease.compartments())
    }

    fn build_params(&self, values: Vec<ParamValue>) -> ClassicParams {
        let mut params = ClassicParams {
            beta: 0.0,
            gamma: 0.0,
            sigma: None,
            population: None,
        };
        for (spec, value) in self.core.specs().iter().zip(&values) {
            let value = take_scalar(value);
            match spec.name {
                "beta" => params.beta = value,
                "gamma" => params.gamma = value,
                "sigma" => params.sigma = Some(value),
                "n" => params.population = Some(value),
                _ => {}
            }
        }
        params
    }

    fn derivative(&self, p: &ClassicParams, t: T, y: &[f64], dy: &mut [f64]) -> Result<(), EpiError> {
        let sigma = p.sigma.unwrap_or_default();
        match (self.disease, p.population) {
            (Disease::Sir, Some(n)) => classic::sir(t, y, p.beta, p.gamma, n, dy),
            (Disease::Sir, None) => classic::sir_dynamic(t, y, p.beta, p.gamma, dy),
            (Disease::Sis, Some(n)) => classic::sis(t, y, p.beta, p.gamma, n, dy),
            (Disease::Sis, None) => classic::sis_dynamic(t, y, p.beta, p.gamma, dy),
            (Disease::Seir, Some(n)) => classic::seir(t, y, p.beta, p.gamma, sigma, n, dy),
            (Disease::Seir, None) => classic::seir_dynamic(t, y, p.beta, p.gamma, sigma, dy),
        }
    }

    /// Incidence `beta * S * I / N`, a single column.
    fn observable(&self, params: &ClassicParams, result: &SolveResult) -> Result<Array2<f64>, EpiError> {
        let mut out = Array2::zeros((result.len(), 1));
        for (k, &t) in result.times().iter().enumerate() {
            let y = row(result, k);
            out[[k, 0]] = incidence(
                params.beta,
                y[self.disease.susceptible()],
                y[self.disease.infected()],
                self.population_size(params, &y),
                0,
                t,
            )?;
        }
        Ok(out)
    }

    fn default_targets(&self) -> Vec<Slot> {
        vec![Slot::scalar("beta"), Slot::scalar("gamma")]
    }
}

impl_summary!(ClassicModel);
