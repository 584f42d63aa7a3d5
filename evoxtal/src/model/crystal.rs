use std::collections::BTreeMap;

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::base::{Cell, EvoxtalError, Lattice};
use crate::compare::{wrap_fractional, ReducedXtal};
use crate::optimizer::SpacegroupProvider;

/// One site of a crystal, with both coordinate representations kept
/// consistent with the owning lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub atomic_number: u32,
    pub frac: Vector3<f64>,
    pub cart: Vector3<f64>,
}

/// Lifecycle of a structure inside a search run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Hash,
)]
pub enum Status {
    Empty,
    WaitingForOptimization,
    Submitted,
    InProcess,
    StepOptimized,
    Optimized,
    Error,
    Killed,
    Removed,
    Duplicate,
    Restart,
}

impl Status {
    /// Terminal statuses are never advanced by the queue manager.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Optimized | Status::Killed | Status::Removed | Status::Duplicate
        )
    }
}

/// Cheap identity card used by the duplicate sweeper's prefilter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub spacegroup: u16,
    pub enthalpy: f64,
    pub volume: f64,
}

/// A unit cell with atoms and the lifecycle metadata the scheduler tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crystal {
    lattice: Lattice,
    atoms: Vec<Atom>,
    pub generation: u32,
    pub id: u32,
    pub parents: String,
    pub current_opt_step: u32,
    pub fail_count: u32,
    pub status: Status,
    pub enthalpy: Option<f64>,
    pub energy: Option<f64>,
    pub job_id: Option<u64>,
    pub spacegroup_number: u16,
    pub spacegroup_symbol: String,
    /// `(generation, id)` of the retained structure when this one was
    /// tagged as its duplicate.
    pub duplicate_of: Option<(u32, u32)>,
}

impl Crystal {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            atoms: Vec::new(),
            generation: 0,
            id: 0,
            parents: String::new(),
            current_opt_step: 0,
            fail_count: 0,
            status: Status::Empty,
            enthalpy: None,
            energy: None,
            job_id: None,
            spacegroup_number: 1,
            spacegroup_symbol: "P1".to_string(),
            duplicate_of: None,
        }
    }

    pub fn from_cell(cell: &Cell) -> Self {
        let mut xtal = Self::new(cell.lattice.clone());
        for (position, &number) in cell.positions.iter().zip(cell.numbers.iter()) {
            xtal.add_atom(number, *position);
        }
        xtal
    }

    /// Geometry snapshot for comparison and persistence.
    pub fn as_cell(&self) -> Cell {
        Cell::new(
            self.lattice.clone(),
            self.atoms.iter().map(|a| a.frac).collect(),
            self.atoms.iter().map(|a| a.atomic_number).collect(),
        )
    }

    /// A geometry-only copy with fresh lifecycle fields, used as the
    /// starting point for offspring.
    pub fn clone_structure(&self) -> Self {
        let mut xtal = Self::new(self.lattice.clone());
        xtal.atoms = self.atoms.clone();
        xtal
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Replace the lattice, keeping fractional coordinates and re-deriving
    /// the Cartesian ones.
    pub fn set_lattice_keeping_fractional(&mut self, lattice: Lattice) {
        self.lattice = lattice;
        for atom in self.atoms.iter_mut() {
            atom.cart = self.lattice.cartesian_coords(&atom.frac);
        }
    }

    /// Replace the lattice, keeping Cartesian coordinates and re-deriving
    /// the fractional ones.
    pub fn set_lattice_keeping_cartesian(&mut self, lattice: Lattice) {
        self.lattice = lattice;
        for atom in self.atoms.iter_mut() {
            atom.frac = self.lattice.fractional_coords(&atom.cart);
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn add_atom(&mut self, atomic_number: u32, frac: Vector3<f64>) {
        let cart = self.lattice.cartesian_coords(&frac);
        self.atoms.push(Atom {
            atomic_number,
            frac,
            cart,
        });
    }

    pub fn remove_atom(&mut self, index: usize) -> Atom {
        self.atoms.remove(index)
    }

    /// Move the atom at `index` to a new fractional position.
    pub fn set_atom_frac(&mut self, index: usize, frac: Vector3<f64>) {
        let cart = self.lattice.cartesian_coords(&frac);
        let atom = &mut self.atoms[index];
        atom.frac = frac;
        atom.cart = cart;
    }

    /// Atom counts per atomic number.
    pub fn composition(&self) -> BTreeMap<u32, u32> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.atomic_number).or_insert(0) += 1;
        }
        counts
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume()
    }

    /// Enthalpy if set, falling back to the bare energy when no pressure
    /// term was applied.
    pub fn effective_enthalpy(&self) -> Option<f64> {
        self.enthalpy.or(self.energy)
    }

    /// Wrap every atom's fractional coordinates into [0, 1).
    pub fn wrap_atoms_to_cell(&mut self) {
        for atom in self.atoms.iter_mut() {
            wrap_fractional(&mut atom.frac);
            atom.cart = self.lattice.cartesian_coords(&atom.frac);
        }
    }

    /// Scale the cell isotropically to the target volume, preserving its
    /// shape and all fractional coordinates.
    pub fn rescale_to_volume(&mut self, target: f64) {
        let lattice = self.lattice.rescaled_to_volume(target);
        self.set_lattice_keeping_fractional(lattice);
    }

    /// Rebuild the lattice from cell parameters (lengths in angstrom,
    /// angles in degrees), preserving fractional coordinates.
    pub fn rescale_cell_parameters(
        &mut self,
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) {
        let lattice = Lattice::from_parameters(a, b, c, alpha, beta, gamma);
        self.set_lattice_keeping_fractional(lattice);
    }

    /// Reduce the cell to its canonical (Niggli, standard orientation)
    /// setting, carrying the atoms along and wrapping them into the new
    /// cell. Atom order is preserved.
    pub fn canonicalize(&mut self) -> Result<(), EvoxtalError> {
        let reduced = ReducedXtal::new(&self.as_cell())?;
        self.lattice = Lattice::from_column_basis(*reduced.cmat());
        self.atoms = reduced
            .types()
            .iter()
            .zip(reduced.fcoords().iter().zip(reduced.ccoords()))
            .map(|(&atomic_number, (&frac, &cart))| Atom {
                atomic_number,
                frac,
                cart,
            })
            .collect();
        Ok(())
    }

    /// Force all inter-axial angles into [60, 120] degrees by substituting
    /// lattice vectors; the Niggli cell satisfies this by construction.
    pub fn fix_angles(&mut self) -> Result<(), EvoxtalError> {
        self.canonicalize()
    }

    /// Shortest distance between any two distinct atoms under periodic
    /// images, or None for fewer than two atoms.
    pub fn shortest_interatomic_distance(&self) -> Option<f64> {
        if self.atoms.len() < 2 {
            return None;
        }
        let mut shortest = f64::INFINITY;
        for i in 0..self.atoms.len() {
            for j in (i + 1)..self.atoms.len() {
                let d = self.periodic_distance(&self.atoms[i].frac, &self.atoms[j].frac);
                if d < shortest {
                    shortest = d;
                }
            }
        }
        Some(shortest)
    }

    /// Minimum Cartesian distance between two fractional positions over
    /// the 27 neighboring images.
    pub fn periodic_distance(&self, f1: &Vector3<f64>, f2: &Vector3<f64>) -> f64 {
        let mut best = f64::INFINITY;
        for di in -1..=1 {
            for dj in -1..=1 {
                for dk in -1..=1 {
                    let shift = Vector3::new(di as f64, dj as f64, dk as f64);
                    let d = self
                        .lattice
                        .cartesian_coords(&(f1 - f2 + shift))
                        .norm();
                    if d < best {
                        best = d;
                    }
                }
            }
        }
        best
    }

    /// Add an atom at a random position, retrying until it clears
    /// `min_iad` against all existing atoms. Returns false if no valid
    /// position was found within `max_attempts`.
    pub fn add_atom_randomly<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        atomic_number: u32,
        min_iad: Option<f64>,
        max_attempts: u32,
    ) -> bool {
        for _ in 0..max_attempts {
            let frac = Vector3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
            let clear = match min_iad {
                Some(limit) => self
                    .atoms
                    .iter()
                    .all(|atom| self.periodic_distance(&frac, &atom.frac) >= limit),
                None => true,
            };
            if clear {
                self.add_atom(atomic_number, frac);
                return true;
            }
        }
        false
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            spacegroup: self.spacegroup_number,
            enthalpy: self.effective_enthalpy().unwrap_or(0.0),
            volume: self.volume(),
        }
    }

    /// Look up the spacegroup through the optional capability; without
    /// one, every structure is P1.
    pub fn find_spacegroup(&mut self, provider: Option<&dyn SpacegroupProvider>, tol: f64) {
        match provider {
            Some(provider) => {
                let (number, symbol, _html) = provider.spacegroup_of(self, tol);
                self.spacegroup_number = number;
                self.spacegroup_symbol = symbol;
            }
            None => {
                self.spacegroup_number = 1;
                self.spacegroup_symbol = "P1".to_string();
            }
        }
    }

    /// Replace this crystal's cell and atoms with another's, keeping all
    /// lifecycle fields. Used when a failed structure is randomized in
    /// place.
    pub fn replace_geometry(&mut self, other: &Crystal) {
        self.lattice = other.lattice.clone();
        self.atoms = other.atoms.clone();
    }

    /// Tag used for directories and log lines, e.g. `00002x00005`.
    pub fn tag(&self) -> String {
        format!("{:05}x{:05}", self.generation, self.id)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{matrix, vector, Matrix3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{Crystal, Status};
    use crate::base::Lattice;

    fn cubic(a: f64) -> Lattice {
        Lattice::new(Matrix3::identity() * a)
    }

    #[test]
    fn test_add_atom_keeps_coords_consistent() {
        let mut xtal = Crystal::new(Lattice::new(matrix![
            3.0, 0.0, 0.0;
            2.0, 4.0, 0.0;
            2.0, 5.0, 3.0;
        ]));
        xtal.add_atom(14, vector![0.25, 0.5, 0.75]);
        let atom = &xtal.atoms()[0];
        assert_relative_eq!(
            atom.cart,
            xtal.lattice().cartesian_coords(&atom.frac),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_wrap_atoms() {
        let mut xtal = Crystal::new(cubic(4.0));
        xtal.add_atom(1, vector![1.25, -0.5, 0.5]);
        xtal.wrap_atoms_to_cell();
        assert_relative_eq!(xtal.atoms()[0].frac, vector![0.25, 0.5, 0.5], epsilon = 1e-12);
    }

    #[test]
    fn test_rescale_to_volume() {
        let mut xtal = Crystal::new(cubic(4.0));
        xtal.add_atom(1, vector![0.5, 0.5, 0.5]);
        xtal.rescale_to_volume(125.0);
        assert_relative_eq!(xtal.volume(), 125.0, epsilon = 1e-9);
        assert_relative_eq!(xtal.atoms()[0].frac, vector![0.5, 0.5, 0.5], epsilon = 1e-12);
    }

    #[test]
    fn test_fix_angles_lands_in_range() {
        // A strongly skewed cell
        let mut xtal = Crystal::new(Lattice::new(matrix![
            4.0, 0.0, 0.0;
            3.6, 1.8, 0.0;
            1.0, 1.0, 5.0;
        ]));
        xtal.add_atom(1, vector![0.1, 0.2, 0.3]);
        xtal.fix_angles().unwrap();
        let (alpha, beta, gamma) = xtal.lattice().angles();
        for angle in [alpha, beta, gamma] {
            assert!(
                (59.99..=120.01).contains(&angle),
                "angle {angle} escaped [60, 120]"
            );
        }
    }

    #[test]
    fn test_shortest_distance_sees_periodic_images() {
        let mut xtal = Crystal::new(cubic(10.0));
        xtal.add_atom(1, vector![0.02, 0.5, 0.5]);
        xtal.add_atom(1, vector![0.98, 0.5, 0.5]);
        // Across the boundary the atoms are 0.4 angstrom apart
        assert_relative_eq!(
            xtal.shortest_interatomic_distance().unwrap(),
            0.4,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_add_atom_randomly_respects_min_iad() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut xtal = Crystal::new(cubic(6.0));
        xtal.add_atom(12, vector![0.5, 0.5, 0.5]);
        assert!(xtal.add_atom_randomly(&mut rng, 8, Some(1.5), 200));
        assert!(xtal.shortest_interatomic_distance().unwrap() >= 1.5);
    }

    #[test]
    fn test_status_terminality() {
        assert!(Status::Optimized.is_terminal());
        assert!(Status::Duplicate.is_terminal());
        assert!(!Status::InProcess.is_terminal());
        assert!(!Status::StepOptimized.is_terminal());
    }

    #[test]
    fn test_composition() {
        let mut xtal = Crystal::new(cubic(5.0));
        xtal.add_atom(12, vector![0.0, 0.0, 0.0]);
        xtal.add_atom(8, vector![0.5, 0.5, 0.5]);
        xtal.add_atom(8, vector![0.25, 0.25, 0.25]);
        let composition = xtal.composition();
        assert_eq!(composition.get(&12), Some(&1));
        assert_eq!(composition.get(&8), Some(&2));
    }
}
