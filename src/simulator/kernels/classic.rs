//! Single population SIR, SIS and SEIR systems.
//!
//! Each system comes in two flavours. The plain functions take the population size
//! `n` as a fixed parameter. The `*_dynamic` functions use the current sum of
//! all compartments instead.

use super::{add_local_flows, incidence, Disease};
use crate::{error::EpiError, simulator::T};

/// SIR with fixed population `n`. State: `[S, I, R]`.
pub fn sir(t: T, y: &[f64], beta: f64, gamma: f64, n: f64, dy: &mut [f64]) -> Result<(), EpiError> {
    local(Disease::Sir, t, y, beta, gamma, 0.0, Some(n), dy)
}

/// SIR with `N = S + I + R`.
pub fn sir_dynamic(t: T, y: &[f64], beta: f64, gamma: f64, dy: &mut [f64]) -> Result<(), EpiError> {
    local(Disease::Sir, t, y, beta, gamma, 0.0, None, dy)
}

/// SIS with fixed population `n`. State: `[S, I]`.
pub fn sis(t: T, y: &[f64], beta: f64, gamma: f64, n: f64, dy: &mut [f64]) -> Result<(), EpiError> {
    local(Disease::Sis, t, y, beta, gamma, 0.0, Some(n), dy)
}

/// SIS with `N = S + I`.
pub fn sis_dynamic(t: T, y: &[f64], beta: f64, gamma: f64, dy: &mut [f64]) -> Result<(), EpiError> {
    local(Disease::Sis, t, y, beta, gamma, 0.0, None, dy)
}

/// SEIR with fixed population `n`. State: `[S, E, I, R]`, `sigma` is the incubation rate.
#[allow(clippy::too_many_arguments)]
pub fn seir(
    t: T,
    y: &[f64],
    beta: f64,
    gamma: f64,
    sigma: f64,
    n: f64,
    dy: &mut [f64],
) -> Result<(), EpiError> {
    local(Disease::Seir, t, y, beta, gamma, sigma, Some(n), dy)
}

/// SEIR with `N = S + E + I + R`.
pub fn seir_dynamic(
    t: T,
    y: &[f64],
    beta: f64,
    gamma: f64,
    sigma: f64,
    dy: &mut [f64],
) -> Result<(), EpiError> {
    local(Disease::Seir, t, y, beta, gamma, sigma, None, dy)
}

#[allow(clippy::too_many_arguments)]
#[inline(always)]
pub(crate) fn local(
    disease: Disease,
    t: T,
    y: &[f64],
    beta: f64,
    gamma: f64,
    sigma: f64,
    n: Option<f64>,
    dy: &mut [f64],
) -> Result<(), EpiError> {
    debug_assert_eq!(y.len(), disease.compartments());
    debug_assert_eq!(dy.len(), disease.compartments());
    let n = n.unwrap_or_else(|| y.iter().sum());
    let new_infections = incidence(beta, y[disease.susceptible()], y[disease.infected()], n, 0, t)?;
    dy.fill(0.0);
    add_local_flows(disease, y, dy, |c| c, new_infections, gamma, sigma);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sir_matches_hand_computation() {
        let mut dy = [0.0; 3];
        sir(0.0, &[990.0, 10.0, 0.0], 0.2, 0.1, 1000.0, &mut dy).unwrap();
        assert_relative_eq!(dy[0], -1.98, epsilon = 1e-12);
        assert_relative_eq!(dy[1], 0.98, epsilon = 1e-12);
        assert_relative_eq!(dy[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dynamic_population_uses_state_sum() {
        let y = [450.0, 50.0, 0.0];
        let mut fixed = [0.0; 3];
        let mut dynamic = [0.0; 3];
        sir(0.0, &y, 0.3, 0.1, 500.0, &mut fixed).unwrap();
        sir_dynamic(0.0, &y, 0.3, 0.1, &mut dynamic).unwrap();
        assert_eq!(fixed, dynamic);
    }

    #[test]
    fn sis_returns_recovered_to_susceptible() {
        let mut dy = [0.0; 2];
        sis(0.0, &[100.0, 0.0], 0.5, 0.2, 100.0, &mut dy).unwrap();
        assert_eq!(dy, [0.0, 0.0]);
        sis(0.0, &[0.0, 100.0], 0.5, 0.2, 100.0, &mut dy).unwrap();
        assert_relative_eq!(dy[0], 20.0);
        assert_relative_eq!(dy[1], -20.0);
    }

    #[test]
    fn seir_infection_goes_through_exposed() {
        let mut dy = [0.0; 4];
        seir(0.0, &[900.0, 0.0, 100.0, 0.0], 0.5, 0.1, 0.2, 1000.0, &mut dy).unwrap();
        assert_relative_eq!(dy[0], -45.0);
        assert_relative_eq!(dy[1], 45.0);
        assert_relative_eq!(dy[2], -10.0);
        assert_relative_eq!(dy[3], 10.0);
    }

    #[test]
    fn zero_population_is_a_domain_error() {
        let mut dy = [0.0; 3];
        assert!(matches!(
            sir_dynamic(1.0, &[0.0, 0.0, 0.0], 0.2, 0.1, &mut dy),
            Err(EpiError::Domain { node: 0, .. })
        ));
        assert!(sir(1.0, &[1.0, 1.0, 0.0], 0.2, 0.1, 0.0, &mut dy).is_err());
    }
}
