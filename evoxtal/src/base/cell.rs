use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::lattice::Lattice;

/// Fractional coordinates
pub type Position = Vector3<f64>;
/// Atomic number
pub type AtomicSpecie = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Geometric description of a periodic structure: the comparator input view
pub struct Cell {
    /// Unit-cell lattice.
    pub lattice: Lattice,
    /// Fractional coordinates, one entry per site.
    pub positions: Vec<Position>,
    /// Atomic number of each site, parallel to `positions`.
    pub numbers: Vec<AtomicSpecie>,
}

impl Cell {
    pub fn new(lattice: Lattice, positions: Vec<Position>, numbers: Vec<AtomicSpecie>) -> Self {
        if positions.len() != numbers.len() {
            panic!("every site position needs exactly one atomic number");
        }
        Self {
            lattice,
            positions,
            numbers,
        }
    }

    /// Number of sites in the cell.
    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    /// Sorted multiset of atomic numbers, used for composition checks.
    pub fn sorted_numbers(&self) -> Vec<AtomicSpecie> {
        let mut numbers = self.numbers.clone();
        numbers.sort_unstable();
        numbers
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{vector, Matrix3};

    use super::Cell;
    use crate::base::lattice::Lattice;

    #[test]
    #[should_panic(expected = "atomic number")]
    fn test_rejects_site_without_species() {
        // One Mg/O pair declared, but only a single coordinate given
        Cell::new(
            Lattice::new(Matrix3::<f64>::identity() * 4.2),
            vec![vector![0.0, 0.0, 0.0]],
            vec![12, 8],
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let lattice = Lattice::new(Matrix3::<f64>::identity() * 3.5);
        let cell = Cell::new(
            lattice,
            vec![vector![0.0, 0.0, 0.0], vector![0.5, 0.5, 0.5]],
            vec![12, 8],
        );
        let json = serde_json::to_string(&cell).unwrap();
        let back: Cell = serde_json::from_str(&json).unwrap();
        assert_eq!(back.numbers, cell.numbers);
        assert_relative_eq!(back.lattice.basis, cell.lattice.basis);
        assert_relative_eq!(back.positions[1], cell.positions[1]);
    }

    #[test]
    fn test_sorted_numbers() {
        let lattice = Lattice::new(Matrix3::<f64>::identity());
        let positions = vec![
            vector![0.0, 0.0, 0.0],
            vector![0.5, 0.5, 0.5],
            vector![0.25, 0.25, 0.25],
        ];
        let cell = Cell::new(lattice, positions, vec![8, 1, 8]);
        assert_eq!(cell.sorted_numbers(), vec![1, 8, 8]);
    }
}
