use std::borrow::Cow;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use super::Compartments;
use crate::{
    error::EpiError,
    simulator::{
        layout::{Mobility, StateLayout},
        solve::SolveResult,
    },
};

/// Labelled time series extracted from a solved model, one column per label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub times: Vec<f64>,
    pub labels: Vec<String>,
    /// `(times, labels)`
    pub values: Array2<f64>,
}

impl Series {
    pub fn column(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|j| self.values.column(j))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// Every compartment, summed over nodes.
    All,
    /// One compartment, summed over nodes.
    Compartment(usize),
    /// One compartment at one node.
    Node(usize, usize),
    /// One compartment, one series per node.
    Nodes(usize),
}

fn invalid(mode: &str, reason: impl Into<String>) -> EpiError {
    EpiError::InvalidMode {
        mode: mode.to_string(),
        reason: reason.into(),
    }
}

/// Modes are `all`, a compartment name or code, `<code>-all` or `<code>-<node>` with
/// 1-based node numbers. Matching is case-insensitive.
fn parse(mode: &str, compartments: &Compartments, layout: &StateLayout) -> Result<Selection, EpiError> {
    let key = mode.trim().to_lowercase();
    if key == "all" {
        return Ok(Selection::All);
    }
    if let Some(c) = compartments.index_of(&key) {
        return Ok(Selection::Compartment(c));
    }
    let Some((code, node)) = key.rsplit_once('-') else {
        return Err(invalid(mode, "unknown compartment"));
    };
    let c = compartments
        .index_of(code)
        .ok_or_else(|| invalid(mode, format!("unknown compartment '{}'", code)))?;
    if layout.mobility() == Mobility::None {
        return Err(invalid(mode, "the model has no nodes"));
    }
    if node == "all" {
        return Ok(Selection::Nodes(c));
    }
    match node.parse::<usize>() {
        Ok(n) if (1..=layout.nodes()).contains(&n) => Ok(Selection::Node(c, n - 1)),
        Ok(n) => Err(invalid(
            mode,
            format!("node {} out of range 1..={}", n, layout.nodes()),
        )),
        Err(_) => Err(invalid(mode, format!("'{}' is not a node number", node))),
    }
}

/// The state at row `k` as a slice, borrowing when the row is contiguous.
pub(crate) fn row(result: &SolveResult, k: usize) -> Cow<'_, [f64]> {
    let row = result.state(k);
    match row.to_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(row.to_vec()),
    }
}

pub(crate) fn extract(
    compartments: &Compartments,
    layout: &StateLayout,
    result: &SolveResult,
    mode: &str,
) -> Result<Series, EpiError> {
    let selection = parse(mode, compartments, layout)?;
    let name = |c: usize| compartments.name(c).unwrap_or_default().to_string();
    let nodes = layout.nodes();

    // (label, compartment, node); no node means summed over nodes
    let columns: Vec<(String, usize, Option<usize>)> = match selection {
        Selection::All => (0..compartments.len()).map(|c| (name(c), c, None)).collect(),
        Selection::Compartment(c) => vec![(name(c), c, None)],
        Selection::Node(c, j) => vec![(format!("{} {}", name(c), j + 1), c, Some(j))],
        Selection::Nodes(c) => (0..nodes)
            .map(|j| (format!("{} {}", name(c), j + 1), c, Some(j)))
            .collect(),
    };

    let mut values = Array2::zeros((result.len(), columns.len()));
    for k in 0..result.len() {
        let y = row(result, k);
        for (column, &(_, c, node)) in columns.iter().enumerate() {
            values[[k, column]] = match node {
                None => layout.total(&y, c),
                Some(j) => layout.present(&y, c, j),
            };
        }
    }
    Ok(Series {
        times: result.times().to_vec(),
        labels: columns.into_iter().map(|(label, _, _)| label).collect(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn eulerian() -> (Compartments, StateLayout, SolveResult) {
        let compartments =
            Compartments::new(&["Susceptible", "Infected", "Population"], &["s", "i", "n"]).unwrap();
        let layout = StateLayout::eulerian(3, 2);
        let result = SolveResult::new(
            vec![0.0, 1.0],
            array![
                [90.0, 50.0, 10.0, 0.0, 100.0, 50.0],
                [80.0, 49.0, 20.0, 1.0, 100.0, 50.0]
            ],
        );
        (compartments, layout, result)
    }

    #[test]
    fn all_sums_over_nodes() {
        let (c, l, r) = eulerian();
        let series = extract(&c, &l, &r, "all").unwrap();
        assert_eq!(series.labels, ["Susceptible", "Infected", "Population"]);
        assert_eq!(series.values.row(1).to_vec(), vec![129.0, 21.0, 150.0]);
    }

    #[test]
    fn compartment_by_code_or_name() {
        let (c, l, r) = eulerian();
        let by_code = extract(&c, &l, &r, "I").unwrap();
        let by_name = extract(&c, &l, &r, "infected").unwrap();
        assert_eq!(by_code, by_name);
        assert_eq!(by_code.column("Infected").unwrap().to_vec(), vec![10.0, 21.0]);
    }

    #[test]
    fn node_modes_are_one_based() {
        let (c, l, r) = eulerian();
        let series = extract(&c, &l, &r, "i-2").unwrap();
        assert_eq!(series.labels, ["Infected 2"]);
        assert_eq!(series.values.column(0).to_vec(), vec![0.0, 1.0]);

        let series = extract(&c, &l, &r, "s-all").unwrap();
        assert_eq!(series.labels, ["Susceptible 1", "Susceptible 2"]);
    }

    #[test]
    fn bad_modes_are_rejected() {
        let (c, l, r) = eulerian();
        for mode in ["x", "i-0", "i-3", "i-one", "q-all"] {
            assert!(
                matches!(extract(&c, &l, &r, mode), Err(EpiError::InvalidMode { .. })),
                "{}",
                mode
            );
        }
    }

    #[test]
    fn lagrangian_nodes_count_people_present() {
        let c = Compartments::new(&["Population"], &["n"]).unwrap();
        let l = StateLayout::lagrangian(1, 2);
        let r = SolveResult::new(vec![0.0], array![[90.0, 10.0, 5.0, 45.0]]);
        let series = extract(&c, &l, &r, "n-all").unwrap();
        assert_eq!(series.values.row(0).to_vec(), vec![95.0, 55.0]);
    }
}
