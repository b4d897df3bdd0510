//! Pure population movement between nodes.

use ndarray::Array2;

use crate::simulator::{layout::StateLayout, T};

/// Eulerian exchange over `K` nodes. `flow[[i, j]]` is the per-capita rate from `i` to `j`.
///
/// `dy[i] = sum_j flow[j, i] * y[j] - flow[i, j] * y[i]`
pub fn eulerian(_t: T, y: &[f64], flow: &Array2<f64>, dy: &mut [f64]) {
    let layout = StateLayout::eulerian(1, flow.nrows());
    debug_assert_eq!(y.len(), layout.len());
    dy.fill(0.0);
    add_eulerian_exchange(&layout, 0, y, flow, dy);
}

/// Lagrangian commuting over `K` nodes. The state is `y[home, location]`, flattened
/// home-major. Residents leave home to `j` at rate `out[[i, j]]` and visitors return
/// at rate `inflow[[i, j]]`.
pub fn lagrangian(_t: T, y: &[f64], out: &Array2<f64>, inflow: &Array2<f64>, dy: &mut [f64]) {
    let layout = StateLayout::lagrangian(1, out.nrows());
    debug_assert_eq!(y.len(), layout.len());
    dy.fill(0.0);
    add_lagrangian_exchange(&layout, 0, y, out, inflow, dy);
}

/// Adds the Eulerian exchange of compartment `c` to `dy`.
#[inline(always)]
pub(crate) fn add_eulerian_exchange(
    layout: &StateLayout,
    c: usize,
    y: &[f64],
    flow: &Array2<f64>,
    dy: &mut [f64],
) {
    let k = layout.nodes();
    for i in 0..k {
        let from = layout.at(c, i);
        for j in (0..k).filter(|&j| j != i) {
            let moved = flow[[i, j]] * y[from];
            dy[from] -= moved;
            dy[layout.at(c, j)] += moved;
        }
    }
}

/// Adds the Lagrangian exchange of compartment `c` to `dy`.
///
/// Diagonal entries of `out` and `inflow` describe trips from a node to itself and are ignored.
#[inline(always)]
pub(crate) fn add_lagrangian_exchange(
    layout: &StateLayout,
    c: usize,
    y: &[f64],
    out: &Array2<f64>,
    inflow: &Array2<f64>,
    dy: &mut [f64],
) {
    let k = layout.nodes();
    for i in 0..k {
        let home = layout.at_pair(c, i, i);
        for j in (0..k).filter(|&j| j != i) {
            let away = layout.at_pair(c, i, j);
            let leaving = out[[i, j]] * y[home];
            let returning = inflow[[i, j]] * y[away];
            dy[home] += returning - leaving;
            dy[away] += leaving - returning;
        }
    }
}
