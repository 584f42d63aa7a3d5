use nalgebra::{Matrix3, Vector3};

use crate::base::{Cell, EvoxtalError};
use crate::compare::expand::{expand_fractional_coordinates, DuplicateMap};
use crate::math::stable;
use crate::math::{niggli_reduce, standard_orientation};

/// Guard tolerance for `fmod` wrap results that land just below zero.
pub const WRAP_PRECISION: f64 = 1e-8;

/// Wrap a single fractional component into [0, 1).
pub fn wrap_component(x: f64) -> f64 {
    let mut x = x % 1.0;
    if stable::lt(x, 0.0, WRAP_PRECISION) {
        x += 1.0;
    }
    x
}

/// Wrap a fractional coordinate into [0, 1) componentwise.
pub fn wrap_fractional(v: &mut Vector3<f64>) {
    v[0] = wrap_component(v[0]);
    v[1] = wrap_component(v[1]);
    v[2] = wrap_component(v[2]);
}

/// A crystal description canonicalized for comparison: Niggli reduced,
/// rotated into the standard orientation, fractional coordinates wrapped
/// into [0, 1).
#[derive(Debug, Clone)]
pub struct ReducedXtal {
    types: Vec<u32>,
    fcoords: Vec<Vector3<f64>>,
    ccoords: Vec<Vector3<f64>>,
    /// Cell matrix: columns are lattice vectors, `ccoord = cmat * fcoord`
    cmat: Matrix3<f64>,
    /// Fractionation matrix: `fcoord = fmat * ccoord`
    fmat: Matrix3<f64>,
}

impl ReducedXtal {
    pub fn new(cell: &Cell) -> Result<Self, EvoxtalError> {
        let cmat = cell.lattice.basis;
        let ccoords = cell.positions.iter().map(|f| cmat * f).collect();
        let fmat = cmat
            .try_inverse()
            .ok_or(EvoxtalError::LatticeIllConditioned)?;
        let mut rx = Self {
            types: cell.numbers.clone(),
            fcoords: cell.positions.clone(),
            ccoords,
            cmat,
            fmat,
        };
        rx.canonicalize()?;
        Ok(rx)
    }

    /// Niggli reduce the cell, rotate it into the standard orientation and
    /// wrap all atoms into the new cell.
    fn canonicalize(&mut self) -> Result<(), EvoxtalError> {
        let orig_volume = self.volume();

        let (reduced, _) = niggli_reduce(&self.cmat)?;

        let std_cell = standard_orientation(&reduced);
        let rot = std_cell
            * reduced
                .try_inverse()
                .ok_or(EvoxtalError::LatticeIllConditioned)?;
        let new_fmat = std_cell
            .try_inverse()
            .ok_or(EvoxtalError::LatticeIllConditioned)?;

        self.cmat = std_cell;
        self.fmat = new_fmat;
        for (ccoord, fcoord) in self.ccoords.iter_mut().zip(self.fcoords.iter_mut()) {
            *ccoord = rot * *ccoord;
            *fcoord = new_fmat * *ccoord;
            wrap_fractional(fcoord);
        }

        debug_assert!(stable::eq(
            orig_volume,
            self.volume(),
            stable::STABLE_TOL * orig_volume.powf(1.0 / 3.0)
        ));
        Ok(())
    }

    pub fn num_atoms(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &[u32] {
        &self.types
    }

    pub fn ccoords(&self) -> &[Vector3<f64>] {
        &self.ccoords
    }

    pub fn fcoords(&self) -> &[Vector3<f64>] {
        &self.fcoords
    }

    pub fn cmat(&self) -> &Matrix3<f64> {
        &self.cmat
    }

    pub fn fmat(&self) -> &Matrix3<f64> {
        &self.fmat
    }

    pub fn volume(&self) -> f64 {
        self.cmat.determinant().abs()
    }

    pub fn v1(&self) -> Vector3<f64> {
        self.cmat.column(0).into()
    }

    pub fn v2(&self) -> Vector3<f64> {
        self.cmat.column(1).into()
    }

    pub fn v3(&self) -> Vector3<f64> {
        self.cmat.column(2).into()
    }

    /// Translate all atoms by the fractional vector `frac_trans`, then add
    /// boundary images within `cart_tol` of a cell face, recording them in
    /// `duplicates`.
    pub fn translate_and_expand(
        &mut self,
        frac_trans: &Vector3<f64>,
        cart_tol: f64,
        duplicates: &mut DuplicateMap,
    ) {
        for fcoord in self.fcoords.iter_mut() {
            *fcoord += frac_trans;
        }

        expand_fractional_coordinates(
            &mut self.types,
            &mut self.fcoords,
            duplicates,
            &self.cmat,
            cart_tol,
        );

        self.ccoords = self.fcoords.iter().map(|f| self.cmat * f).collect();
    }
}
