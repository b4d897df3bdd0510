use std::{collections::HashMap, fmt};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

/// A single parameter value: a rate, a per-node vector or a node-by-node matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Array2<f64>),
}

impl ParamValue {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ParamValue::Scalar(_) => vec![],
            ParamValue::Vector(v) => vec![v.len()],
            ParamValue::Matrix(m) => m.shape().to_vec(),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            ParamValue::Scalar(v) => v.is_finite(),
            ParamValue::Vector(v) => v.iter().all(|x| x.is_finite()),
            ParamValue::Matrix(m) => m.iter().all(|x| x.is_finite()),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(value: Vec<f64>) -> Self {
        ParamValue::Vector(value)
    }
}

impl From<&[f64]> for ParamValue {
    fn from(value: &[f64]) -> Self {
        ParamValue::Vector(value.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for ParamValue {
    fn from(value: [f64; N]) -> Self {
        ParamValue::Vector(value.to_vec())
    }
}

impl From<Array2<f64>> for ParamValue {
    fn from(value: Array2<f64>) -> Self {
        ParamValue::Matrix(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Scalar(v) => write!(f, "{}", v),
            ParamValue::Vector(v) => write!(f, "{:?}", v),
            ParamValue::Matrix(m) => write!(f, "{:?}", m.outer_iter().map(|r| r.to_vec()).collect::<Vec<_>>()),
        }
    }
}

/// A parameter assignment, either in declaration order or by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSet {
    Positional(Vec<ParamValue>),
    Named(Vec<(String, ParamValue)>),
}

impl ParamSet {
    /// Named assignment from `(name, value)` pairs.
    pub fn named<S, V>(entries: impl IntoIterator<Item = (S, V)>) -> Self
    where
        S: Into<String>,
        V: Into<ParamValue>,
    {
        ParamSet::Named(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl From<Vec<ParamValue>> for ParamSet {
    fn from(values: Vec<ParamValue>) -> Self {
        ParamSet::Positional(values)
    }
}

/// Positional assignment of scalar parameters.
impl From<Vec<f64>> for ParamSet {
    fn from(values: Vec<f64>) -> Self {
        ParamSet::Positional(values.into_iter().map(ParamValue::Scalar).collect())
    }
}

impl<const N: usize> From<[f64; N]> for ParamSet {
    fn from(values: [f64; N]) -> Self {
        values.to_vec().into()
    }
}

impl From<HashMap<String, ParamValue>> for ParamSet {
    fn from(values: HashMap<String, ParamValue>) -> Self {
        ParamSet::Named(values.into_iter().collect())
    }
}

impl From<Vec<(&str, ParamValue)>> for ParamSet {
    fn from(values: Vec<(&str, ParamValue)>) -> Self {
        ParamSet::named(values)
    }
}

/// Expected form of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    /// One value per node.
    NodeVector,
    /// A node-by-node matrix.
    NodeMatrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Scalar,
        }
    }

    pub const fn vector(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::NodeVector,
        }
    }

    pub const fn matrix(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::NodeMatrix,
        }
    }

    fn check(&self, nodes: usize, value: &ParamValue) -> Result<(), ParameterError> {
        let expected = match (self.kind, value) {
            (ParamKind::Scalar, ParamValue::Scalar(_)) => vec![],
            (ParamKind::NodeVector, ParamValue::Vector(_)) => vec![nodes],
            (ParamKind::NodeMatrix, ParamValue::Matrix(_)) => vec![nodes, nodes],
            (kind, _) => {
                return Err(ParameterError::Kind {
                    name: self.name.to_string(),
                    expected: match kind {
                        ParamKind::Scalar => "scalar",
                        ParamKind::NodeVector => "vector",
                        ParamKind::NodeMatrix => "matrix",
                    },
                })
            }
        };
        if value.shape() != expected {
            return Err(ParameterError::Shape {
                name: self.name.to_string(),
                expected,
                found: value.shape(),
            });
        }
        if !value.is_finite() {
            return Err(ParameterError::NonFinite {
                name: self.name.to_string(),
            });
        }
        Ok(())
    }
}

/// Validates `set` against the declared parameters and returns the values in declaration order.
///
/// Names are matched case-insensitively.
pub(crate) fn resolve(
    specs: &[ParamSpec],
    nodes: usize,
    set: ParamSet,
) -> Result<Vec<ParamValue>, ParameterError> {
    let values = match set {
        ParamSet::Positional(values) => {
            if values.len() != specs.len() {
                return Err(ParameterError::CountMismatch {
                    expected: specs.len(),
                    found: values.len(),
                });
            }
            values
        }
        ParamSet::Named(entries) => {
            let mut by_name: HashMap<String, ParamValue> = HashMap::with_capacity(entries.len());
            for (name, value) in entries {
                let key = name.to_lowercase();
                if !specs.iter().any(|s| s.name.eq_ignore_ascii_case(&key)) {
                    return Err(ParameterError::UnknownKey { name });
                }
                if by_name.insert(key, value).is_some() {
                    return Err(ParameterError::DuplicateName { name });
                }
            }
            specs
                .iter()
                .map(|spec| {
                    by_name
                        .remove(&spec.name.to_lowercase())
                        .ok_or_else(|| ParameterError::MissingKey {
                            name: spec.name.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    for (spec, value) in specs.iter().zip(&values) {
        spec.check(nodes, value)?;
    }
    Ok(values)
}

/// Position of one scalar inside a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Index {
    Whole,
    Node(usize),
    Edge(usize, usize),
}

/// One scalar degree of freedom of a model's parameters, e.g. `beta`, `beta[2]` or `F[0,1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    name: String,
    index: Index,
}

impl Slot {
    pub fn new(name: &str, index: Index) -> Self {
        Self {
            name: name.to_lowercase(),
            index,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::new(name, Index::Whole)
    }

    pub fn node(name: &str, node: usize) -> Self {
        Self::new(name, Index::Node(node))
    }

    pub fn edge(name: &str, from: usize, to: usize) -> Self {
        Self::new(name, Index::Edge(from, to))
    }

    /// Parses `name`, `name[i]` or `name[i,j]`.
    pub fn parse(text: &str) -> Result<Self, ParameterError> {
        let malformed = || ParameterError::UnknownKey {
            name: text.to_string(),
        };
        let text = text.trim();
        let Some((name, rest)) = text.split_once('[') else {
            return Ok(Self::scalar(text));
        };
        let inner = rest.strip_suffix(']').ok_or_else(malformed)?;
        let indices = inner
            .split(',')
            .map(|s| s.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed())?;
        match indices.as_slice() {
            [i] => Ok(Self::node(name.trim(), *i)),
            [i, j] => Ok(Self::edge(name.trim(), *i, *j)),
            _ => Err(malformed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Index {
        self.index
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Index::Whole => write!(f, "{}", self.name),
            Index::Node(i) => write!(f, "{}[{}]", self.name, i),
            Index::Edge(i, j) => write!(f, "{}[{},{}]", self.name, i, j),
        }
    }
}

/// Typed parameters of a model family.
pub trait ModelParams: Clone + fmt::Debug + Send + Sync {
    /// The parameters as named values, in declaration order.
    fn entries(&self) -> Vec<(&'static str, ParamValue)>;

    /// The value of one scalar, `None` if the slot does not exist.
    fn slot(&self, slot: &Slot) -> Option<f64>;

    /// Mutable access to one scalar, `None` if the slot does not exist.
    fn slot_mut(&mut self, slot: &Slot) -> Option<&mut f64>;

    /// A copy with the given slots replaced by `values`.
    fn with_slots(&self, slots: &[Slot], values: &[f64]) -> Result<Self, ParameterError> {
        if slots.len() != values.len() {
            return Err(ParameterError::CountMismatch {
                expected: slots.len(),
                found: values.len(),
            });
        }
        let mut params = self.clone();
        for (slot, &value) in slots.iter().zip(values) {
            *params
                .slot_mut(slot)
                .ok_or_else(|| ParameterError::UnknownKey {
                    name: slot.to_string(),
                })? = value;
        }
        Ok(params)
    }
}

#[inline]
pub(crate) fn scalar_value(value: f64, index: Index) -> Option<f64> {
    matches!(index, Index::Whole).then_some(value)
}

#[inline]
pub(crate) fn vector_value(values: &[f64], index: Index) -> Option<f64> {
    match index {
        Index::Node(i) => values.get(i).copied(),
        _ => None,
    }
}

#[inline]
pub(crate) fn matrix_value(values: &Array2<f64>, index: Index) -> Option<f64> {
    match index {
        Index::Edge(i, j) => values.get((i, j)).copied(),
        _ => None,
    }
}

#[inline]
pub(crate) fn scalar_slot(value: &mut f64, index: Index) -> Option<&mut f64> {
    matches!(index, Index::Whole).then_some(value)
}

#[inline]
pub(crate) fn vector_slot(values: &mut [f64], index: Index) -> Option<&mut f64> {
    match index {
        Index::Node(i) => values.get_mut(i),
        _ => None,
    }
}

#[inline]
pub(crate) fn matrix_slot(values: &mut Array2<f64>, index: Index) -> Option<&mut f64> {
    match index {
        Index::Edge(i, j) => values.get_mut((i, j)),
        _ => None,
    }
}

/// Takes the scalar out of a value already checked by [resolve].
pub(crate) fn take_scalar(value: &ParamValue) -> f64 {
    match value {
        ParamValue::Scalar(v) => *v,
        _ => f64::NAN,
    }
}

pub(crate) fn take_vector(value: ParamValue) -> Vec<f64> {
    match value {
        ParamValue::Vector(v) => v,
        _ => Vec::new(),
    }
}

pub(crate) fn take_matrix(value: ParamValue) -> Array2<f64> {
    match value {
        ParamValue::Matrix(m) => m,
        _ => Array2::zeros((0, 0)),
    }
}

/// Per-node disease rates shared by the metapopulation models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRates {
    pub beta: Vec<f64>,
    pub gamma: Vec<f64>,
    /// Incubation rates, empty unless the disease has an exposed stage.
    pub sigma: Vec<f64>,
}

impl NodeRates {
    pub(crate) fn entries(&self, out: &mut Vec<(&'static str, ParamValue)>) {
        out.push(("beta", ParamValue::Vector(self.beta.clone())));
        out.push(("gamma", ParamValue::Vector(self.gamma.clone())));
        if !self.sigma.is_empty() {
            out.push(("sigma", ParamValue::Vector(self.sigma.clone())));
        }
    }

    pub(crate) fn slot(&self, slot: &Slot) -> Option<f64> {
        match slot.name() {
            "beta" => vector_value(&self.beta, slot.index()),
            "gamma" => vector_value(&self.gamma, slot.index()),
            "sigma" => vector_value(&self.sigma, slot.index()),
            _ => None,
        }
    }

    pub(crate) fn slot_mut(&mut self, slot: &Slot) -> Option<&mut f64> {
        match slot.name() {
            "beta" => vector_slot(&mut self.beta, slot.index()),
            "gamma" => vector_slot(&mut self.gamma, slot.index()),
            "sigma" => vector_slot(&mut self.sigma, slot.index()),
            _ => None,
        }
    }

    /// Builds the rates from resolved values `beta, gamma[, sigma]`.
    pub(crate) fn from_values(values: impl Iterator<Item = ParamValue>) -> Self {
        let mut values = values.map(take_vector);
        Self {
            beta: values.next().unwrap_or_default(),
            gamma: values.next().unwrap_or_default(),
            sigma: values.next().unwrap_or_default(),
        }
    }

    pub(crate) fn sigma(&self) -> Option<&[f64]> {
        (!self.sigma.is_empty()).then_some(self.sigma.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const SPECS: [ParamSpec; 3] = [
        ParamSpec::matrix("F"),
        ParamSpec::vector("beta"),
        ParamSpec::vector("gamma"),
    ];

    fn valid() -> Vec<(&'static str, ParamValue)> {
        vec![
            ("F", array![[0.0, 0.1], [0.2, 0.0]].into()),
            ("beta", vec![0.3, 0.2].into()),
            ("gamma", vec![0.1, 0.1].into()),
        ]
    }

    #[test]
    fn named_values_come_back_in_declaration_order() {
        let mut entries = valid();
        entries.reverse();
        let values = resolve(&SPECS, 2, entries.into()).unwrap();
        assert_eq!(values[1], ParamValue::Vector(vec![0.3, 0.2]));
    }

    #[test]
    fn count_mismatch_is_reported() {
        let err = resolve(&SPECS, 2, vec![ParamValue::Scalar(1.0)].into()).unwrap_err();
        assert_eq!(
            err,
            ParameterError::CountMismatch {
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn missing_unknown_and_duplicate_keys_are_reported() {
        let mut entries = valid();
        entries.pop();
        assert!(matches!(
            resolve(&SPECS, 2, entries.into()),
            Err(ParameterError::MissingKey { name }) if name == "gamma"
        ));

        let mut entries = valid();
        entries.push(("delta", 1.0.into()));
        assert!(matches!(
            resolve(&SPECS, 2, entries.into()),
            Err(ParameterError::UnknownKey { .. })
        ));

        let mut entries = valid();
        entries.push(("Beta", vec![0.1, 0.1].into()));
        assert!(matches!(
            resolve(&SPECS, 2, entries.into()),
            Err(ParameterError::DuplicateName { .. })
        ));
    }

    #[test]
    fn matrix_must_be_square_over_nodes() {
        let mut entries = valid();
        entries[0].1 = Array2::<f64>::zeros((2, 3)).into();
        let err = resolve(&SPECS, 2, entries.into()).unwrap_err();
        assert_eq!(
            err,
            ParameterError::Shape {
                name: "F".to_string(),
                expected: vec![2, 2],
                found: vec![2, 3]
            }
        );
    }

    #[test]
    fn wrong_kind_and_non_finite_values_are_rejected() {
        let mut entries = valid();
        entries[1].1 = 0.3.into();
        assert!(matches!(
            resolve(&SPECS, 2, entries.into()),
            Err(ParameterError::Kind { .. })
        ));

        let mut entries = valid();
        entries[2].1 = vec![0.1, f64::NAN].into();
        assert!(matches!(
            resolve(&SPECS, 2, entries.into()),
            Err(ParameterError::NonFinite { .. })
        ));
    }

    #[test]
    fn slots_parse_and_print() {
        assert_eq!(Slot::parse("beta").unwrap(), Slot::scalar("beta"));
        assert_eq!(Slot::parse("Beta[2]").unwrap(), Slot::node("beta", 2));
        assert_eq!(Slot::parse("F[0, 1]").unwrap(), Slot::edge("f", 0, 1));
        assert_eq!(Slot::edge("out", 1, 0).to_string(), "out[1,0]");
        assert!(Slot::parse("beta[x]").is_err());
        assert!(Slot::parse("beta[1,2,3]").is_err());
    }
}
