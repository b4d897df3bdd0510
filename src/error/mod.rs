use thiserror::Error;

/// Errors raised while assigning parameters to a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Expected {expected} parameter values, got {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("Missing parameter '{name}'")]
    MissingKey { name: String },
    #[error("Unknown parameter '{name}'")]
    UnknownKey { name: String },
    #[error("Duplicate parameter name: '{name}'")]
    DuplicateName { name: String },
    #[error("Parameter '{name}' must have shape {expected:?}, got {found:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Parameter '{name}' must be a {expected}")]
    Kind { name: String, expected: &'static str },
    #[error("Parameter '{name}' contains a non-finite value")]
    NonFinite { name: String },
}

/// Errors in the structural metadata of a model, raised at construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("A metapopulation needs at least 2 nodes, got {nodes}")]
    TooFewNodes { nodes: usize },
    #[error("Got {names} compartment names but {codes} short codes")]
    LengthMismatch { names: usize, codes: usize },
    #[error("Duplicate compartment name: '{name}'")]
    DuplicateCompartment { name: String },
    #[error("Duplicate compartment code: '{code}'")]
    DuplicateCode { code: String },
}

/// Failure reported by a numerical integration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Integrator failed: {0}")]
    Integrator(String),
    #[error("Non-finite derivative at t = {time}")]
    NonFinite { time: f64 },
    #[error("State of length {found} given, the model expects {expected}")]
    StateLength { expected: usize, found: usize },
    #[error("Deadline exceeded at t = {time}")]
    DeadlineExceeded { time: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EpiError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error("The parameters of model '{model}' are not valid, call set_params first")]
    InvalidParameters { model: String },
    #[error("Solving model '{model}' failed: {cause}")]
    Solve { model: String, cause: SolveError },
    #[error("Model '{model}' has no initial value, call set_initial_value first")]
    MissingInitialValue { model: String },
    #[error("Model '{model}' is not solved")]
    NotSolved { model: String },
    #[error("Invalid extraction mode '{mode}': {reason}")]
    InvalidMode { mode: String, reason: String },
    #[error("Zero {what} at node {node} (t = {time})")]
    Domain {
        what: &'static str,
        node: usize,
        time: f64,
    },
    #[error("Optimizer error: {0}")]
    Optimizer(String),
}
