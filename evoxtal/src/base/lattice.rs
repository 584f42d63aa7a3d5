use nalgebra::base::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::base::error::EvoxtalError;
use crate::math::{is_niggli_reduced, niggli_reduce, standard_orientation};

pub const RAD_TO_DEG: f64 = 57.2957795131;
pub const DEG_TO_RAD: f64 = 0.0174532925199;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// The unit-cell lattice: three basis vectors stored column-wise
pub struct Lattice {
    /// Column `i` holds lattice vector `i`
    pub basis: Matrix3<f64>,
}

impl Lattice {
    /// Build a lattice from a matrix whose *rows* are the lattice
    /// vectors, the layout crystal descriptions usually arrive in.
    pub fn new(row_basis: Matrix3<f64>) -> Self {
        Self {
            basis: row_basis.transpose(),
        }
    }

    /// Build a lattice directly from a column-wise basis matrix.
    pub fn from_column_basis(basis: Matrix3<f64>) -> Self {
        Self { basis }
    }

    /// Build a lattice from cell parameters: `a` along +x, `b` in the xy
    /// plane, angles in degrees.
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let alpha = alpha * DEG_TO_RAD;
        let beta = beta * DEG_TO_RAD;
        let gamma = gamma * DEG_TO_RAD;

        let v1 = Vector3::new(a, 0.0, 0.0);
        let v2 = Vector3::new(b * gamma.cos(), b * gamma.sin(), 0.0);
        let cx = c * beta.cos();
        let cy = c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
        let cz = (c * c - cx * cx - cy * cy).max(0.0).sqrt();
        let v3 = Vector3::new(cx, cy, cz);

        Self {
            basis: Matrix3::from_columns(&[v1, v2, v3]),
        }
    }

    /// Niggli-reduce this lattice; also yields the change-of-basis matrix
    /// that produced the reduced cell.
    pub fn niggli_reduce(&self) -> Result<(Self, Matrix3<f64>), EvoxtalError> {
        let (reduced_basis, trans_mat) = niggli_reduce(&self.basis)?;
        Ok((
            Self {
                basis: reduced_basis,
            },
            trans_mat,
        ))
    }

    /// Does this cell already satisfy the Niggli conditions?
    pub fn is_niggli_reduced(&self) -> bool {
        is_niggli_reduced(&self.basis)
    }

    /// Return this lattice rotated into the standard orientation (first
    /// vector along +x, second in the xy plane)
    pub fn standard_orientation(&self) -> Matrix3<f64> {
        standard_orientation(&self.basis)
    }

    /// Gram matrix of the lattice vectors; entry `(i, j)` is `v_i . v_j`.
    pub fn metric_tensor(&self) -> Matrix3<f64> {
        self.basis.transpose() * self.basis
    }

    /// Return the fractional-from-cartesian matrix
    pub fn inverse(&self) -> Matrix3<f64> {
        self.basis
            .try_inverse()
            .expect("lattice basis must be invertible")
    }

    /// Take a fractional coordinate into Cartesian space.
    pub fn cartesian_coords(&self, fractional_coords: &Vector3<f64>) -> Vector3<f64> {
        self.basis * fractional_coords
    }

    /// Take a Cartesian coordinate into the fractional basis.
    pub fn fractional_coords(&self, cartesian_coords: &Vector3<f64>) -> Vector3<f64> {
        self.inverse() * cartesian_coords
    }

    /// Unsigned cell volume.
    pub fn volume(&self) -> f64 {
        self.basis.determinant().abs()
    }

    /// Lattice vector lengths `(a, b, c)`
    pub fn lengths(&self) -> (f64, f64, f64) {
        (
            self.basis.column(0).norm(),
            self.basis.column(1).norm(),
            self.basis.column(2).norm(),
        )
    }

    /// Inter-axial angles `(alpha, beta, gamma)` in degrees
    pub fn angles(&self) -> (f64, f64, f64) {
        let v1 = self.basis.column(0);
        let v2 = self.basis.column(1);
        let v3 = self.basis.column(2);
        let angle = |p: f64, n1: f64, n2: f64| (p / (n1 * n2)).clamp(-1.0, 1.0).acos() * RAD_TO_DEG;
        let (a, b, c) = self.lengths();
        (
            angle(v2.dot(&v3), b, c),
            angle(v1.dot(&v3), a, c),
            angle(v1.dot(&v2), a, b),
        )
    }

    /// Apply a rigid rotation to all three lattice vectors.
    pub fn rotate(&self, rotation_matrix: &Matrix3<f64>) -> Self {
        Self {
            basis: rotation_matrix * self.basis,
        }
    }

    /// Scale the lattice isotropically so its volume becomes `target`
    pub fn rescaled_to_volume(&self, target: f64) -> Self {
        let factor = (target / self.volume()).powf(1.0 / 3.0);
        Self {
            basis: self.basis * factor,
        }
    }
}
