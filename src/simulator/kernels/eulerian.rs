//! Disease dynamics on `K` nodes coupled by Eulerian flows.
//!
//! The state holds the disease compartments followed by the total population `N`,
//! each as a block of `K` nodes. Transmission at node `i` uses the local `N[i]`, and
//! every compartment, `N` included, is exchanged through the flow matrix.

use ndarray::Array2;

use super::{add_local_flows, incidence, movement::add_eulerian_exchange, Disease};
use crate::{
    error::EpiError,
    simulator::{layout::StateLayout, T},
};

/// State: `[S; I; R; N]`, each of length `K`.
pub fn sir(
    t: T,
    y: &[f64],
    flow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Sir, t, y, flow, beta, gamma, None, dy)
}

/// State: `[S; I; N]`, each of length `K`.
pub fn sis(
    t: T,
    y: &[f64],
    flow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Sis, t, y, flow, beta, gamma, None, dy)
}

/// State: `[S; E; I; R; N]`, each of length `K`.
#[allow(clippy::too_many_arguments)]
pub fn seir(
    t: T,
    y: &[f64],
    flow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    sigma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Seir, t, y, flow, beta, gamma, Some(sigma), dy)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn transmission(
    disease: Disease,
    t: T,
    y: &[f64],
    flow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    sigma: Option<&[f64]>,
    dy: &mut [f64],
) -> Result<(), EpiError> {
    let k = flow.nrows();
    let population = disease.compartments();
    let layout = StateLayout::eulerian(population + 1, k);
    debug_assert_eq!(y.len(), layout.len());

    dy.fill(0.0);
    for node in 0..k {
        let at = |c: usize| layout.at(c, node);
        let new_infections = incidence(
            beta[node],
            y[at(disease.susceptible())],
            y[at(disease.infected())],
            y[at(population)],
            node,
            t,
        )?;
        let sigma = sigma.map_or(0.0, |s| s[node]);
        add_local_flows(disease, y, dy, at, new_infections, gamma[node], sigma);
    }
    for c in 0..layout.compartments() {
        add_eulerian_exchange(&layout, c, y, flow, dy);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::kernels::classic;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn without_flow_nodes_evolve_like_classic_sir() {
        let flow = Array2::zeros((2, 2));
        let y = [990.0, 480.0, 10.0, 20.0, 0.0, 0.0, 1000.0, 500.0];
        let mut dy = [0.0; 8];
        sir(0.0, &y, &flow, &[0.2, 0.4], &[0.1, 0.05], &mut dy).unwrap();

        let mut node0 = [0.0; 3];
        classic::sir(0.0, &[990.0, 10.0, 0.0], 0.2, 0.1, 1000.0, &mut node0).unwrap();
        assert_relative_eq!(dy[0], node0[0]);
        assert_relative_eq!(dy[2], node0[1]);
        assert_relative_eq!(dy[4], node0[2]);
        assert_eq!(dy[6], 0.0);
        assert_eq!(dy[7], 0.0);
    }

    #[test]
    fn flow_moves_every_compartment() {
        let flow = array![[0.0, 0.1], [0.0, 0.0]];
        let y = [100.0, 0.0, 0.0, 0.0, 100.0, 50.0];
        let mut dy = [0.0; 6];
        sis(0.0, &y, &flow, &[0.0, 0.0], &[0.0, 0.0], &mut dy).unwrap();
        assert_eq!(dy, [-10.0, 10.0, 0.0, 0.0, -10.0, 10.0]);
    }

    #[test]
    fn seir_uses_infectious_compartment_for_transmission() {
        let flow = Array2::zeros((2, 2));
        // S, E, I, R, N per node
        let y = [
            900.0, 900.0, 100.0, 0.0, 0.0, 100.0, 0.0, 0.0, 1000.0, 1000.0,
        ];
        let mut dy = [0.0; 10];
        seir(0.0, &y, &flow, &[0.5, 0.5], &[0.1, 0.1], &[0.2, 0.2], &mut dy).unwrap();
        // node 0 has exposed but no infectious people
        assert_eq!(dy[0], 0.0);
        assert_relative_eq!(dy[1], -45.0);
    }

    #[test]
    fn empty_node_is_a_domain_error() {
        let flow = Array2::zeros((2, 2));
        let y = [10.0, 0.0, 1.0, 0.0, 11.0, 0.0];
        let mut dy = [0.0; 6];
        let err = sis(3.0, &y, &flow, &[0.1, 0.1], &[0.1, 0.1], &mut dy).unwrap_err();
        assert!(matches!(err, EpiError::Domain { node: 1, .. }));
    }
}
