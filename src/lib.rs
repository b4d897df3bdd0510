pub mod error;
pub mod optimize;
pub mod simulator;

pub use crate::error::{EpiError, ParameterError, SolveError, StructureError};
pub use crate::optimize::{Estimate, Estimator, EstimatorConfig, Noise};
pub use crate::simulator::*;

pub mod prelude {
    pub mod models {
        pub use crate::simulator::model::{
            ClassicModel, EulerianModel, LagrangianModel, Model, Population,
        };
        pub use crate::simulator::Disease;
    }
    pub mod kernels {
        pub use crate::simulator::kernels::{classic, eulerian, lagrangian, movement};
    }
    pub mod solve {
        pub use crate::simulator::solve::{
            Dopri5, Failure, Integrator, IntegratorOutput, Rhs, SolveResult,
        };
    }

    pub use crate::error::EpiError;
    pub use crate::optimize::{Estimate, Estimator, EstimatorConfig, Noise};
    pub use crate::simulator::model::{
        ClassicModel, EulerianModel, LagrangianModel, Model, ModelParams, ParamSet, ParamValue,
        Population, Series, Slot,
    };
    pub use crate::simulator::solve::{Dopri5, SolveResult};
    pub use crate::simulator::Disease;

    /// Builds a named [ParamSet] from `name => value` pairs.
    ///
    /// ```ignore
    /// model.set_params(params! { "beta" => 0.2, "gamma" => 0.1, "n" => 1000.0 })?;
    /// ```
    #[macro_export]
    macro_rules! params {
        ($($name:expr => $value:expr),* $(,)?) => {
            $crate::simulator::model::ParamSet::Named(vec![
                $((
                    ::std::string::String::from($name),
                    $crate::simulator::model::ParamValue::from($value),
                ),)*
            ])
        };
    }
}
