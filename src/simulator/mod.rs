//! Compartmental epidemic models and their numerical solution.
//!
//! - [kernels]: the right-hand sides, as pure functions of `(t, y, parameters)`.
//! - [layout]: how compartments and nodes are flattened into the state vector.
//! - [model]: the model hierarchy holding metadata, parameters, initial values and results.
//! - [solve]: the integrator interface and the default [solve::Dopri5] integrator.

pub mod kernels;
pub mod layout;
pub mod model;
pub mod solve;

/// Time type used throughout the simulator.
pub type T = f64;

pub use kernels::Disease;
pub use layout::{Mobility, StateLayout};
pub use model::{
    ClassicModel, ClassicParams, Compartments, EulerianModel, EulerianParams, LagrangianModel,
    LagrangianParams, Model, ModelParams, NodeRates, ParamSet, ParamValue, Population, Series,
    Slot,
};
pub use solve::{Dopri5, Integrator, SolveResult};
