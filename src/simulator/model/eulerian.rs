use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{
    impl_summary,
    params::{matrix_slot, matrix_value, take_matrix},
    row, Compartments, Model, ModelCore, ModelParams, NodeRates, ParamSpec, ParamValue, Slot,
};
use crate::{
    error::{EpiError, StructureError},
    simulator::{
        kernels::{eulerian, incidence, movement, Disease},
        layout::StateLayout,
        solve::SolveResult,
        T,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EulerianParams {
    /// `flow[i, j]`: fraction of node `i` moving to node `j` per unit time. The diagonal is ignored.
    pub flow: Array2<f64>,
    /// `None` for pure movement.
    pub rates: Option<NodeRates>,
}

impl ModelParams for EulerianParams {
    fn entries(&self) -> Vec<(&'static str, ParamValue)> {
        let mut entries = vec![("F", self.flow.clone().into())];
        if let Some(rates) = &self.rates {
            rates.entries(&mut entries);
        }
        entries
    }

    fn slot(&self, slot: &Slot) -> Option<f64> {
        match slot.name() {
            "f" => matrix_value(&self.flow, slot.index()),
            _ => self.rates.as_ref()?.slot(slot),
        }
    }

    fn slot_mut(&mut self, slot: &Slot) -> Option<&mut f64> {
        match slot.name() {
            "f" => matrix_slot(&mut self.flow, slot.index()),
            _ => self.rates.as_mut()?.slot_mut(slot),
        }
    }
}

/// Metapopulation whose nodes exchange a fraction of every compartment.
///
/// The state holds the disease compartments followed by the node populations `N`, each
/// a block of `K` entries. Parameters, in order: `F`, then per-node `beta`, `gamma` and
/// `sigma` for SEIR. A pure movement model tracks `N` only and takes just `F`.
#[derive(Debug, Clone)]
pub struct EulerianModel {
    core: ModelCore<EulerianParams>,
    disease: Option<Disease>,
    nodes: usize,
}

impl EulerianModel {
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
        let mut specs = vec![ParamSpec::matrix("F")];
        if let Some(disease) = disease {
            specs.push(ParamSpec::vector("beta"));
            specs.push(ParamSpec::vector("gamma"));
            if disease.has_incubation() {
                specs.push(ParamSpec::vector("sigma"));
            }
        }
        let name = match disease {
            None => "Eulerian flux".to_string(),
            Some(disease) => format!("Eulerian {}", disease.label()),
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

    /// Movement only.
    pub fn flux(nodes: usize) -> Result<Self, EpiError> {
        Self::new(None, nodes)
    }

    pub fn disease(&self) -> Option<Disease> {
        self.disease
    }
}

impl Model for EulerianModel {
    type Params = EulerianParams;

    fn core(&self) -> &ModelCore<EulerianParams> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<EulerianParams> {
        &mut self.core
    }

    fn layout(&self) -> StateLayout {
        StateLayout::eulerian(self.core.compartments().len(), self.nodes)
    }

    fn build_params(&self, values: Vec<ParamValue>) -> EulerianParams {
        let mut values = values.into_iter();
        let flow = values.next().map(take_matrix).unwrap_or_default();
        EulerianParams {
            flow,
            rates: self.disease.map(|_| NodeRates::from_values(values)),
        }
    }

    fn derivative(&self, p: &EulerianParams, t: T, y: &[f64], dy: &mut [f64]) -> Result<(), EpiError> {
        let (disease, rates) = match (self.disease, &p.rates) {
            (Some(disease), Some(rates)) => (disease, rates),
            _ => {
                movement::eulerian(t, y, &p.flow, dy);
                return Ok(());
            }
        };
        match disease {
            Disease::Sir => eulerian::sir(t, y, &p.flow, &rates.beta, &rates.gamma, dy),
            Disease::Sis => eulerian::sis(t, y, &p.flow, &rates.beta, &rates.gamma, dy),
            Disease::Seir => {
                eulerian::seir(t, y, &p.flow, &rates.beta, &rates.gamma, &rates.sigma, dy)
            }
        }
    }

    /// Incidence `beta[i] * S[i] * I[i] / N[i]` per node, or the node populations for
    /// pure movement.
    fn observable(&self, params: &EulerianParams, result: &SolveResult) -> Result<Array2<f64>, EpiError> {
        let layout = self.layout();
        let population = layout.compartments() - 1;
        let mut out = Array2::zeros((result.len(), self.nodes));
        for (k, &t) in result.times().iter().enumerate() {
            let y = row(result, k);
            for node in 0..self.nodes {
                out[[k, node]] = match (self.disease, &params.rates) {
                    (Some(disease), Some(rates)) => incidence(
                        rates.beta[node],
                        y[layout.at(disease.susceptible(), node)],
                        y[layout.at(disease.infected(), node)],
                        y[layout.at(population, node)],
                        node,
                        t,
                    )?,
                    _ => y[layout.at(population, node)],
                };
            }
        }
        Ok(out)
    }

    fn default_targets(&self) -> Vec<Slot> {
        match self.disease {
            Some(_) => (0..self.nodes).map(|i| Slot::node("beta", i)).collect(),
            None => off_diagonal("F", self.nodes),
        }
    }
}

impl_summary!(EulerianModel);

/// `name[i,j]` for every `i != j`.
pub(crate) fn off_diagonal(name: &str, nodes: usize) -> Vec<Slot> {
    (0..nodes)
        .flat_map(|i| (0..nodes).filter(move |&j| j != i).map(move |j| (i, j)))
        .map(|(i, j)| Slot::edge(name, i, j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ParameterError, simulator::model::ParamSet};
    use ndarray::array;

    #[test]
    fn needs_two_nodes() {
        assert_eq!(
            EulerianModel::sir(1).unwrap_err(),
            EpiError::Structure(StructureError::TooFewNodes { nodes: 1 })
        );
    }

    #[test]
    fn parameter_shapes_follow_node_count() {
        let mut model = EulerianModel::sir(3).unwrap();
        assert_eq!(model.param_names(), ["F", "beta", "gamma"]);
        let err = model
            .set_params(ParamSet::named([
                ("F", ParamValue::from(Array2::<f64>::zeros((2, 2)))),
                ("beta", vec![0.1; 3].into()),
                ("gamma", vec![0.1; 3].into()),
            ]))
            .unwrap_err();
        assert!(matches!(err, EpiError::Parameter(ParameterError::Shape { .. })));

        model
            .set_params(ParamSet::named([
                ("F", ParamValue::from(Array2::<f64>::zeros((3, 3)))),
                ("beta", vec![0.1; 3].into()),
                ("gamma", vec![0.1; 3].into()),
            ]))
            .unwrap();
        assert_eq!(model.layout().len(), 12);
    }

    #[test]
    fn flux_has_only_the_population() {
        let mut model = EulerianModel::flux(2).unwrap();
        assert_eq!(model.param_names(), ["F"]);
        assert_eq!(model.compartments().codes(), ["n"]);
        model
            .set_params(vec![ParamValue::from(array![[0.0, 0.5], [0.0, 0.0]])])
            .unwrap();
        let dy = model.evaluate_rhs(0.0, &[10.0, 0.0]).unwrap();
        assert_eq!(dy, vec![-5.0, 5.0]);
        assert_eq!(
            model.default_targets(),
            vec![Slot::edge("f", 0, 1), Slot::edge("f", 1, 0)]
        );
    }

    #[test]
    fn slots_address_matrix_and_rates() {
        let model = EulerianModel::seir(2).unwrap();
        let params = model
            .parse_params(vec![
                ParamValue::from(array![[0.0, 0.1], [0.2, 0.0]]),
                vec![0.3, 0.4].into(),
                vec![0.1, 0.1].into(),
                vec![0.2, 0.25].into(),
            ])
            .unwrap();
        assert_eq!(params.slot(&Slot::parse("F[1,0]").unwrap()), Some(0.2));
        assert_eq!(params.slot(&Slot::parse("sigma[1]").unwrap()), Some(0.25));
        assert_eq!(params.slot(&Slot::parse("beta[2]").unwrap()), None);
        assert_eq!(params.entries().len(), 4);
    }

    #[test]
    fn wrong_state_length_is_reported() {
        let mut model = EulerianModel::sis(2).unwrap();
        model
            .set_params(vec![
                ParamValue::from(Array2::<f64>::zeros((2, 2))),
                vec![0.1, 0.1].into(),
                vec![0.1, 0.1].into(),
            ])
            .unwrap();
        assert!(matches!(
            model.evaluate_rhs(0.0, &[1.0; 4]),
            Err(EpiError::Solve { .. })
        ));
    }
}
