/// How the nodes of a model are laid out in the flat state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mobility {
    /// One population, one entry per compartment.
    None,
    /// `K` nodes, one entry per compartment and node.
    Eulerian,
    /// `K` home nodes times `K` locations, one entry per compartment, home and location.
    Lagrangian,
}

/// Maps `(compartment, node[, location])` to positions in the flat state vector.
///
/// The layout is compartment-major: every compartment occupies a contiguous block,
/// of `K` entries for Eulerian models and `K * K` (home-major) for Lagrangian ones.
/// Kernels and extraction routines go through this mapping so the flattening
/// convention lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    compartments: usize,
    nodes: usize,
    mobility: Mobility,
}

impl StateLayout {
    pub fn single(compartments: usize) -> Self {
        Self {
            compartments,
            nodes: 1,
            mobility: Mobility::None,
        }
    }

    pub fn eulerian(compartments: usize, nodes: usize) -> Self {
        Self {
            compartments,
            nodes,
            mobility: Mobility::Eulerian,
        }
    }

    pub fn lagrangian(compartments: usize, nodes: usize) -> Self {
        Self {
            compartments,
            nodes,
            mobility: Mobility::Lagrangian,
        }
    }

    #[inline(always)]
    pub fn compartments(&self) -> usize {
        self.compartments
    }

    #[inline(always)]
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    #[inline(always)]
    pub fn mobility(&self) -> Mobility {
        self.mobility
    }

    /// Number of entries a single compartment occupies.
    #[inline(always)]
    pub fn block(&self) -> usize {
        match self.mobility {
            Mobility::None => 1,
            Mobility::Eulerian => self.nodes,
            Mobility::Lagrangian => self.nodes * self.nodes,
        }
    }

    /// Length of the flat state vector.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.compartments * self.block()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of compartment `c` at node `i` (Eulerian) or of the whole
    /// compartment (single population, `i` must be 0).
    #[inline(always)]
    pub fn at(&self, c: usize, i: usize) -> usize {
        debug_assert!(self.mobility != Mobility::Lagrangian);
        debug_assert!(c < self.compartments && i < self.nodes);
        c * self.block() + i
    }

    /// Flat index of compartment `c` for agents from `home` currently at `location`.
    #[inline(always)]
    pub fn at_pair(&self, c: usize, home: usize, location: usize) -> usize {
        debug_assert!(self.mobility == Mobility::Lagrangian);
        debug_assert!(c < self.compartments && home < self.nodes && location < self.nodes);
        c * self.block() + home * self.nodes + location
    }

    /// Range of the flat vector holding compartment `c`.
    #[inline(always)]
    pub fn compartment(&self, c: usize) -> std::ops::Range<usize> {
        let start = c * self.block();
        start..start + self.block()
    }

    /// Amount of compartment `c` present at node `j`.
    ///
    /// For Lagrangian layouts this sums over every home node, for Eulerian layouts it
    /// is the entry itself.
    #[inline(always)]
    pub fn present(&self, y: &[f64], c: usize, j: usize) -> f64 {
        match self.mobility {
            Mobility::None => y[self.at(c, 0)],
            Mobility::Eulerian => y[self.at(c, j)],
            Mobility::Lagrangian => (0..self.nodes).map(|i| y[self.at_pair(c, i, j)]).sum(),
        }
    }

    /// Total amount of compartment `c` over all nodes.
    #[inline(always)]
    pub fn total(&self, y: &[f64], c: usize) -> f64 {
        y[self.compartment(c)].iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eulerian_is_compartment_major() {
        let layout = StateLayout::eulerian(4, 3);
        assert_eq!(layout.len(), 12);
        assert_eq!(layout.at(0, 0), 0);
        assert_eq!(layout.at(1, 0), 3);
        assert_eq!(layout.at(3, 2), 11);
        assert_eq!(layout.compartment(2), 6..9);
    }

    #[test]
    fn lagrangian_is_home_major_within_compartment() {
        let layout = StateLayout::lagrangian(2, 3);
        assert_eq!(layout.len(), 18);
        assert_eq!(layout.at_pair(0, 0, 1), 1);
        assert_eq!(layout.at_pair(0, 1, 0), 3);
        assert_eq!(layout.at_pair(1, 2, 2), 17);
    }

    #[test]
    fn present_sums_over_homes() {
        let layout = StateLayout::lagrangian(1, 2);
        // y[home, location]
        let y = [10.0, 1.0, 2.0, 20.0];
        assert_eq!(layout.present(&y, 0, 0), 12.0);
        assert_eq!(layout.present(&y, 0, 1), 21.0);
        assert_eq!(layout.total(&y, 0), 33.0);
    }
}
