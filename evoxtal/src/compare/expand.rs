//! Boundary expansion: atoms within a Cartesian tolerance of a cell face
//! get ghost images on the opposite face so that finite tolerances cannot
//! split one physical atom across the comparison boundary.
//!
//! The cell faces are the six planes `x_i = 0` and `x_i = 1` in the
//! fractional basis. Corner configurations (three near planes) are checked
//! first, then edges (two), then single faces; the first matching class
//! wins. The enumeration order is fixed because it defines the index
//! ranges stored in the duplicate map.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

use crate::compare::reduce::wrap_fractional;

/// Maps a preimage atom index to the inclusive index range of its boundary
/// images, so the matcher can consume a whole group at once.
pub type DuplicateMap = HashMap<usize, (usize, usize)>;

/// Corner sign patterns, one per cell corner: +1 selects the low face of
/// that axis, -1 the high face.
const CORNER_SIGNS: [[f64; 3]; 8] = [
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, -1.0],
];

/// Edge patterns as (axis, sign) pairs in the fixed enumeration order.
const EDGE_SIGNS: [((usize, f64), (usize, f64)); 12] = [
    ((1, 1.0), (2, 1.0)),
    ((0, 1.0), (2, 1.0)),
    ((0, 1.0), (1, 1.0)),
    ((0, -1.0), (2, 1.0)),
    ((0, -1.0), (1, 1.0)),
    ((1, -1.0), (2, 1.0)),
    ((0, 1.0), (1, -1.0)),
    ((0, 1.0), (2, -1.0)),
    ((1, 1.0), (2, -1.0)),
    ((0, -1.0), (1, -1.0)),
    ((1, -1.0), (2, -1.0)),
    ((0, -1.0), (2, -1.0)),
];

/// Face patterns as (axis, sign) in plane order 1..6.
const FACE_SIGNS: [(usize, f64); 6] = [
    (0, 1.0),
    (1, 1.0),
    (2, 1.0),
    (0, -1.0),
    (1, -1.0),
    (2, -1.0),
];

fn axis_vector(axis: usize, sign: f64) -> Vector3<f64> {
    let mut v = Vector3::zeros();
    v[axis] = sign;
    v
}

/// Is the atom near the face selected by `(axis, sign)`?
fn near_face(near_low: &[bool; 3], near_high: &[bool; 3], axis: usize, sign: f64) -> bool {
    if sign > 0.0 {
        near_low[axis]
    } else {
        near_high[axis]
    }
}

/// Wrap all coordinates into [0, 1), then append ghost images for atoms
/// within `tol` (Cartesian) of a cell boundary. `duplicates` receives the
/// preimage-to-image-range map and is cleared first.
pub fn expand_fractional_coordinates(
    types: &mut Vec<u32>,
    fcoords: &mut Vec<Vector3<f64>>,
    duplicates: &mut DuplicateMap,
    cmat: &Matrix3<f64>,
    tol: f64,
) {
    assert_eq!(types.len(), fcoords.len());

    duplicates.clear();
    let tol_squared = tol * tol;
    let num_unexpanded = fcoords.len();

    'atoms: for i in 0..num_unexpanded {
        let mut cur = fcoords[i];
        wrap_fractional(&mut cur);
        fcoords[i] = cur;
        let cur_type = types[i];

        // Cartesian distance from the atom to each of the six planes: the
        // plane-normal component of the fractional coordinate, taken to
        // Cartesian space.
        let deltas = [
            (cmat * Vector3::new(cur[0], 0.0, 0.0)).norm_squared(),
            (cmat * Vector3::new(0.0, cur[1], 0.0)).norm_squared(),
            (cmat * Vector3::new(0.0, 0.0, cur[2])).norm_squared(),
            (cmat * Vector3::new(cur[0] - 1.0, 0.0, 0.0)).norm_squared(),
            (cmat * Vector3::new(0.0, cur[1] - 1.0, 0.0)).norm_squared(),
            (cmat * Vector3::new(0.0, 0.0, cur[2] - 1.0)).norm_squared(),
        ];
        let near_low = [
            deltas[0] <= tol_squared,
            deltas[1] <= tol_squared,
            deltas[2] <= tol_squared,
        ];
        let near_high = [
            deltas[3] <= tol_squared,
            deltas[4] <= tol_squared,
            deltas[5] <= tol_squared,
        ];
        if !near_low.iter().chain(near_high.iter()).any(|&b| b) {
            continue;
        }

        let start_idx = fcoords.len();

        // Corners: all three axes near a face.
        for signs in CORNER_SIGNS.iter() {
            if (0..3).all(|axis| near_face(&near_low, &near_high, axis, signs[axis])) {
                let u1 = axis_vector(0, signs[0]);
                let u2 = axis_vector(1, signs[1]);
                let u3 = axis_vector(2, signs[2]);
                for shift in [u1, u2, u3, u1 + u2, u2 + u3, u1 + u3, u1 + u2 + u3] {
                    fcoords.push(cur + shift);
                    types.push(cur_type);
                }
                duplicates.insert(i, (start_idx, fcoords.len() - 1));
                continue 'atoms;
            }
        }

        // Edges: two axes near a face.
        for &((axis_a, sign_a), (axis_b, sign_b)) in EDGE_SIGNS.iter() {
            if near_face(&near_low, &near_high, axis_a, sign_a)
                && near_face(&near_low, &near_high, axis_b, sign_b)
            {
                let ua = axis_vector(axis_a, sign_a);
                let ub = axis_vector(axis_b, sign_b);
                for shift in [ua, ub, ua + ub] {
                    fcoords.push(cur + shift);
                    types.push(cur_type);
                }
                duplicates.insert(i, (start_idx, fcoords.len() - 1));
                continue 'atoms;
            }
        }

        // Single faces.
        for &(axis, sign) in FACE_SIGNS.iter() {
            if near_face(&near_low, &near_high, axis, sign) {
                fcoords.push(cur + axis_vector(axis, sign));
                types.push(cur_type);
                duplicates.insert(i, (start_idx, fcoords.len() - 1));
                continue 'atoms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{vector, Matrix3};

    use super::{expand_fractional_coordinates, DuplicateMap};

    #[test]
    fn test_interior_atom_untouched() {
        let mut types = vec![1];
        let mut fcoords = vec![vector![0.5, 0.5, 0.5]];
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.05,
        );
        assert_eq!(fcoords.len(), 1);
        assert!(duplicates.is_empty());
    }

    #[test]
    fn test_face_atom_single_image() {
        let mut types = vec![1];
        let mut fcoords = vec![vector![0.01, 0.5, 0.5]];
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.05,
        );
        assert_eq!(fcoords.len(), 2);
        assert_relative_eq!(fcoords[1], vector![1.01, 0.5, 0.5], epsilon = 1e-12);
        assert_eq!(duplicates.get(&0), Some(&(1, 1)));
    }

    #[test]
    fn test_edge_atom_three_images() {
        let mut types = vec![2];
        let mut fcoords = vec![vector![0.01, 0.99, 0.5]];
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.05,
        );
        // Edge (x low, y high): images at +x, -y, +x-y
        assert_eq!(fcoords.len(), 4);
        assert_relative_eq!(fcoords[1], vector![1.01, 0.99, 0.5], epsilon = 1e-12);
        assert_relative_eq!(fcoords[2], vector![0.01, -0.01, 0.5], epsilon = 1e-12);
        assert_relative_eq!(fcoords[3], vector![1.01, -0.01, 0.5], epsilon = 1e-12);
        assert_eq!(duplicates.get(&0), Some(&(1, 3)));
        assert_eq!(types, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_corner_atom_seven_images() {
        let mut types = vec![1];
        let mut fcoords = vec![vector![0.001, 0.001, 0.999]];
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.05,
        );
        assert_eq!(fcoords.len(), 8);
        assert_eq!(duplicates.get(&0), Some(&(1, 7)));
        // Last image combines all three shifts
        assert_relative_eq!(fcoords[7], vector![1.001, 1.001, -0.001], epsilon = 1e-12);
    }

    #[test]
    fn test_wraps_before_expanding() {
        let mut types = vec![1];
        let mut fcoords = vec![vector![1.5, -0.25, 0.5]];
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.05,
        );
        assert_relative_eq!(fcoords[0], vector![0.5, 0.75, 0.5], epsilon = 1e-12);
        assert_eq!(fcoords.len(), 1);
    }

    #[test]
    fn test_every_image_is_periodic_copy() {
        let mut types = vec![1, 2, 1];
        let mut fcoords = vec![
            vector![0.0, 0.25, 0.25],
            vector![0.25, 0.25, 0.25],
            vector![0.98, 0.5, 0.02],
        ];
        let originals = fcoords.clone();
        let mut duplicates = DuplicateMap::new();
        expand_fractional_coordinates(
            &mut types,
            &mut fcoords,
            &mut duplicates,
            &Matrix3::identity(),
            0.1,
        );
        for (&pre, &(start, end)) in duplicates.iter() {
            for image in &fcoords[start..=end] {
                let diff = image - originals[pre];
                for k in 0..3 {
                    let r = diff[k] - diff[k].round();
                    assert!(r.abs() < 1e-9, "image is not a lattice translation");
                }
            }
        }
    }
}
