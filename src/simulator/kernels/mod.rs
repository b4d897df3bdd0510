//! Right-hand sides of the epidemic ODE systems.
//!
//! Every kernel is a pure function of `(t, y, parameters)` writing the derivative into
//! `dy`. None of them keep state, so they are safe to call from several threads at once.
//! All models are autonomous: `t` is only used to report where a domain error happened.

pub mod classic;
pub mod eulerian;
pub mod lagrangian;
pub mod movement;

use serde::{Deserialize, Serialize};

use crate::error::EpiError;
use crate::simulator::T;

/// The disease dynamics of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disease {
    Sir,
    Sis,
    Seir,
}

impl Disease {
    /// Number of disease compartments (without the tracked population).
    pub fn compartments(&self) -> usize {
        match self {
            Disease::Sir => 3,
            Disease::Sis => 2,
            Disease::Seir => 4,
        }
    }

    /// Index of the susceptible compartment.
    pub fn susceptible(&self) -> usize {
        0
    }

    /// Index of the infectious compartment.
    pub fn infected(&self) -> usize {
        match self {
            Disease::Sir | Disease::Sis => 1,
            Disease::Seir => 2,
        }
    }

    pub fn has_incubation(&self) -> bool {
        matches!(self, Disease::Seir)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disease::Sir => "SIR",
            Disease::Sis => "SIS",
            Disease::Seir => "SEIR",
        }
    }
}

/// New infections per unit time, `beta * s * i / n`.
#[inline(always)]
pub(crate) fn incidence(beta: f64, s: f64, i: f64, n: f64, node: usize, t: T) -> Result<f64, EpiError> {
    if n == 0.0 {
        return Err(EpiError::Domain {
            what: "population",
            node,
            time: t,
        });
    }
    Ok(beta * s * i / n)
}

/// Adds the local disease flows of one site to `dy`.
///
/// `at(c)` is the flat index of disease compartment `c` at the site, `new_infections`
/// is the incidence there and `sigma` is ignored unless the disease has an incubation stage.
#[inline(always)]
pub(crate) fn add_local_flows(
    disease: Disease,
    y: &[f64],
    dy: &mut [f64],
    at: impl Fn(usize) -> usize,
    new_infections: f64,
    gamma: f64,
    sigma: f64,
) {
    match disease {
        Disease::Sir => {
            let (s, i, r) = (at(0), at(1), at(2));
            let recoveries = gamma * y[i];
            dy[s] -= new_infections;
            dy[i] += new_infections - recoveries;
            dy[r] += recoveries;
        }
        Disease::Sis => {
            let (s, i) = (at(0), at(1));
            let recoveries = gamma * y[i];
            dy[s] += recoveries - new_infections;
            dy[i] += new_infections - recoveries;
        }
        Disease::Seir => {
            let (s, e, i, r) = (at(0), at(1), at(2), at(3));
            let onsets = sigma * y[e];
            let recoveries = gamma * y[i];
            dy[s] -= new_infections;
            dy[e] += new_infections - onsets;
            dy[i] += onsets - recoveries;
            dy[r] += recoveries;
        }
    }
}
