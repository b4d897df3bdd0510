use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{
    eulerian::off_diagonal,
    impl_summary,
    params::{matrix_slot, matrix_value, take_matrix},
    row, Compartments, Model, ModelCore, ModelParams, NodeRates, ParamSpec, ParamValue, Slot,
};
use crate::{
    error::{EpiError, StructureError},
    simulator::{
        kernels::{incidence, lagrangian, movement, Disease},
        layout::StateLayout,
        solve::SolveResult,
        T,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagrangianParams {
    /// `out[i, j]`: rate at which residents of `i` at home travel to `j`.
    pub out: Array2<f64>,
    /// `inflow[i, j]`: rate at which residents of `i` visiting `j` return home.
    pub inflow: Array2<f64>,
    /// `None` for pure movement.
    pub rates: Option<NodeRates>,
}

impl ModelParams for LagrangianParams {
    fn entries(&self) -> Vec<(&'static str, ParamValue)> {
        let mut entries = vec![
            ("Out", self.out.clone().into()),
            ("In", self.inflow.clone().into()),
        ];
        if let Some(rates) = &self.rates {
            rates.entries(&mut entries);
        }
        entries
    }

    fn slot(&self, slot: &Slot) -> Option<f64> {
        match slot.name() {
            "out" => matrix_value(&self.out, slot.index()),
            "in" => matrix_value(&self.inflow, slot.index()),
            _ => self.rates.as_ref()?.slot(slot),
        }
    }

    fn slot_mut(&mut self, slot: &Slot) -> Option<&mut f64> {
        match slot.name() {
            "out" => matrix_slot(&mut self.out, slot.index()),
            "in" => matrix_slot(&mut self.inflow, slot.index()),
            _ => self.rates.as_mut()?.slot_mut(slot),
        }
    }
}

/// Metapopulation of commuters who keep their home node.
///
/// Every compartment is a `K x K` block `y[home, location]`, the last one holding the
/// population `N`. Parameters, in order: `Out`, `In`, then per-node `beta`, `gamma` and
/// `sigma` for SEIR. Transmission happens at the location, among everybody present.
#[derive(Debug, Clone)]
pub struct LagrangianModel {
    core: ModelCore<LagrangianParams>,
    disease: Option<Disease>,
    nodes: usize,
}

impl LagrangianModel {
    pub fn new(disease: Option<Disease>, nodes: usize) -> Result<Self, EpiError> {
        if nodes < 2 {
            return Err(StructureError::TooFewNodes { nodes }.into());
        }
        let compartments = match disease {
            None => Compartments::new(&["Population"], &["n"]),
            Some(Disease::Sir) => Compartments::new(
                &["Susceptible", "Infected", "Recovered", "Population"],
                &["s", "i", "r", "n"],
            ),
            Some(Disease::Sis) => {
                Compartments::new(&["Susceptible", "Infected", "Population"], &["s", "i", "n"])
            }
            Some(Disease::Seir) => Compartments::new(
                &["Susceptible", "Exposed", "Infected", "Recovered", "Population"],
                &["s", "e", "i", "r", "n"],
            ),
        }?;
        let mut specs = vec![ParamSpec::matrix("Out"), ParamSpec::matrix("In")];
        if let Some(disease) = disease {
            specs.push(ParamSpec::vector("beta"));
            specs.push(ParamSpec::vector("gamma"));
            if disease.has_incubation() {
                specs.push(ParamSpec::vector("sigma"));
            }
        }
        let name = match disease {
            None => "Lagrangian flux".to_string(),
            Some(disease) => format!("Lagrangian {}", disease.label()),
        };
        Ok(Self {
            core: ModelCore::new(name, compartments, specs)?,
            disease,
            nodes,
        })
    }

    pub fn sir(nodes: usize) -> Result<Self, EpiError> {
        Self::new(Some(Disease::Sir), nodes)
    }

    pub fn sis(nodes: usize) -> Result<Self, EpiError> {
        Self::new(Some(Disease::Sis), nodes)
    }

    pub fn seir(nodes: usize) -> Result<Self, EpiError> {
        Self::new(Some(Disease::Seir), nodes)
    }

    pub fn flux(nodes: usize) -> Result<Self, EpiError> {
        Self::new(None, nodes)
    }

    pub fn disease(&self) -> Option<Disease> {
        self.disease
    }
}

impl Model for LagrangianModel {
    type Params = LagrangianParams;

    fn core(&self) -> &ModelCore<LagrangianParams> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<LagrangianParams> {
        &mut self.core
    }

    fn layout(&self) -> StateLayout {
        StateLayout::lagrangian(self.core.compartments().len(), self.nodes)
    }

    fn build_params(&self, values: Vec<ParamValue>) -> LagrangianParams {
        let mut values = values.into_iter();
        let out = values.next().map(take_matrix).unwrap_or_default();
        let inflow = values.next().map(take_matrix).unwrap_or_default();
        LagrangianParams {
            out,
            inflow,
            rates: self.disease.map(|_| NodeRates::from_values(values)),
        }
    }

    fn derivative(
        &self,
        p: &LagrangianParams,
        t: T,
        y: &[f64],
        dy: &mut [f64],
    ) -> Result<(), EpiError> {
        let (disease, rates) = match (self.disease, &p.rates) {
            (Some(disease), Some(rates)) => (disease, rates),
            _ => {
                movement::lagrangian(t, y, &p.out, &p.inflow, dy);
                return Ok(());
            }
        };
        let (beta, gamma) = (&rates.beta, &rates.gamma);
        match disease {
            Disease::Sir => lagrangian::sir(t, y, &p.out, &p.inflow, beta, gamma, dy),
            Disease::Sis => lagrangian::sis(t, y, &p.out, &p.inflow, beta, gamma, dy),
            Disease::Seir => {
                lagrangian::seir(t, y, &p.out, &p.inflow, beta, gamma, &rates.sigma, dy)
            }
        }
    }

    /// Incidence at each location, `beta[j] * S_col[j] * I_col[j] / N_col[j]` with column
    /// sums over home nodes, or the number of people present for pure movement.
    fn observable(
        &self,
        params: &LagrangianParams,
        result: &SolveResult,
    ) -> Result<Array2<f64>, EpiError> {
        let layout = self.layout();
        let population = layout.compartments() - 1;
        let mut out = Array2::zeros((result.len(), self.nodes));
        for (k, &t) in result.times().iter().enumerate() {
            let y = row(result, k);
            for location in 0..self.nodes {
                let present = layout.present(&y, population, location);
                out[[k, location]] = match (self.disease, &params.rates) {
                    (Some(disease), Some(rates)) => incidence(
                        rates.beta[location],
                        layout.present(&y, disease.susceptible(), location),
                        layout.present(&y, disease.infected(), location),
                        present,
                        location,
                        t,
                    )?,
                    _ => present,
                };
            }
        }
        Ok(out)
    }

    fn default_targets(&self) -> Vec<Slot> {
        match self.disease {
            Some(_) => (0..self.nodes).map(|i| Slot::node("beta", i)).collect(),
            None => off_diagonal("out", self.nodes),
        }
    }
}

impl_summary!(LagrangianModel);
