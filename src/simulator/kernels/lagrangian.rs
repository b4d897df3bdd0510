//! Disease dynamics on `K` nodes coupled by Lagrangian commuting.
//!
//! The state holds, for the disease compartments followed by the total population `N`,
//! a `K x K` block `y[home, location]`. Agents at a location mix with everybody present
//! there, so the force of infection at `(i, j)` is `beta[j] * I_col[j] / N_col[j]`, where
//! the column sums run over all home nodes. Recovery and incubation happen at the rates of
//! the location.

use ndarray::Array2;

use super::{add_local_flows, movement::add_lagrangian_exchange, Disease};
use crate::{
    error::EpiError,
    simulator::{layout::StateLayout, T},
};

/// State: `[S; I; R; N]`, each of length `K * K`.
#[allow(clippy::too_many_arguments)]
pub fn sir(
    t: T,
    y: &[f64],
    out: &Array2<f64>,
    inflow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Sir, t, y, out, inflow, beta, gamma, None, dy)
}

/// State: `[S; I; N]`, each of length `K * K`.
#[allow(clippy::too_many_arguments)]
pub fn sis(
    t: T,
    y: &[f64],
    out: &Array2<f64>,
    inflow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Sis, t, y, out, inflow, beta, gamma, None, dy)
}

/// State: `[S; E; I; R; N]`, each of length `K * K`.
#[allow(clippy::too_many_arguments)]
pub fn seir(
    t: T,
    y: &[f64],
    out: &Array2<f64>,
    inflow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    sigma: &[f64],
    dy: &mut [f64],
) -> Result<(), EpiError> {
    transmission(Disease::Seir, t, y, out, inflow, beta, gamma, Some(sigma), dy)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn transmission(
    disease: Disease,
    t: T,
    y: &[f64],
    out: &Array2<f64>,
    inflow: &Array2<f64>,
    beta: &[f64],
    gamma: &[f64],
    sigma: Option<&[f64]>,
    dy: &mut [f64],
) -> Result<(), EpiError> {
    let k = out.nrows();
    let population = disease.compartments();
    let layout = StateLayout::lagrangian(population + 1, k);
    debug_assert_eq!(y.len(), layout.len());

    dy.fill(0.0);
    for location in 0..k {
        let present = layout.present(y, population, location);
        if present == 0.0 {
            return Err(EpiError::Domain {
                what: "population",
                node: location,
                time: t,
            });
        }
        let pressure = beta[location] * layout.present(y, disease.infected(), location) / present;
        let sigma = sigma.map_or(0.0, |s| s[location]);
        for home in 0..k {
            let at = |c: usize| layout.at_pair(c, home, location);
            let new_infections = pressure * y[at(disease.susceptible())];
            add_local_flows(disease, y, dy, at, new_infections, gamma[location], sigma);
        }
    }
    for c in 0..layout.compartments() {
        add_lagrangian_exchange(&layout, c, y, out, inflow, dy);
    }
    Ok(())
}
