//! Crystal equivalence: decide whether two periodic descriptions are the
//! same structure under lattice re-indexing, rigid rotation/reflection
//! (enantiomorphs included) and fractional translation.
//!
//! The search anchors on the least frequent atom type: every pair of pivot
//! atoms in a small super-cell of the second crystal proposes candidate
//! lattice vectors, and triples whose lengths and mutual angles match the
//! first crystal's reduced cell become candidate rigid transforms. A
//! transform wins when every transformed atom lands on an unconsumed atom
//! of the first crystal.

use std::collections::BTreeMap;

use itertools::iproduct;
use log::warn;
use nalgebra::{Matrix3, Vector3};

use crate::base::{Cell, EvoxtalError, RigidTransform, RAD_TO_DEG};
use crate::compare::expand::DuplicateMap;
use crate::compare::reduce::{wrap_fractional, ReducedXtal};

/// Tolerance used for the near-zero determinant check when inverting a
/// candidate triple, and for the supercell shape tests.
const NORM_TOL: f64 = 1e-4;

/// Angle between two vectors folded into [0, 90] degrees. Mirrored vector
/// pairs (an enantiomorphic pair of crystals) produce supplementary
/// angles; folding makes them comparable by angle alone.
fn folded_angle(v1: &Vector3<f64>, v2: &Vector3<f64>) -> f64 {
    let cos = v1.dot(v2) / (v1.norm_squared() * v2.norm_squared()).sqrt();
    let angle = (cos.clamp(-1.0, 1.0).acos() * RAD_TO_DEG).abs();
    if angle <= 90.0 {
        angle
    } else {
        180.0 - angle
    }
}

/// Compare two crystal descriptions; `true` iff they describe the same
/// periodic structure. See [`compare_with_transform`] for the tolerances.
pub fn compare(
    cell1: &Cell,
    cell2: &Cell,
    cart_tol: f64,
    angle_tol: f64,
) -> Result<bool, EvoxtalError> {
    Ok(compare_with_transform(cell1, cell2, cart_tol, angle_tol)?.is_some())
}

/// Compare two crystal descriptions and, on a match, return the rigid
/// transform mapping the second onto the first.
///
/// `cart_tol` bounds atomic position mismatches in Cartesian units;
/// `angle_tol` (degrees) bounds candidate sublattice angle mismatches.
/// A canonicalization failure of either input is reported as
/// [`EvoxtalError::ComparisonFailed`]; callers normally treat it as
/// "not matched".
pub fn compare_with_transform(
    cell1: &Cell,
    cell2: &Cell,
    cart_tol: f64,
    angle_tol: f64,
) -> Result<Option<RigidTransform>, EvoxtalError> {
    // Same number of atoms
    if cell1.num_atoms() != cell2.num_atoms() {
        return Ok(None);
    }
    // Same composition
    if cell1.sorted_numbers() != cell2.sorted_numbers() {
        return Ok(None);
    }

    // Standardize the lattices
    let mut rx1 = ReducedXtal::new(cell1).map_err(|e| {
        warn!("failed to canonicalize first lattice: {e}");
        EvoxtalError::ComparisonFailed
    })?;
    let rx2 = ReducedXtal::new(cell2).map_err(|e| {
        warn!("failed to canonicalize second lattice: {e}");
        EvoxtalError::ComparisonFailed
    })?;

    // Match volumes to within 1% of their mean
    let vol1 = rx1.volume();
    let vol2 = rx2.volume();
    let voltol = 0.01 * 0.5 * (vol1 + vol2);
    if (vol1 - vol2).abs() > voltol {
        return Ok(None);
    }

    // Compare cell parameters rather than raw matrices, which would miss
    // certain enantiomorphs. Squared lengths first, with the error scaled
    // as 4 * x * dx:
    let a1 = rx1.v1().norm_squared();
    let b1 = rx1.v2().norm_squared();
    let c1 = rx1.v3().norm_squared();
    let a2 = rx2.v1().norm_squared();
    let b2 = rx2.v2().norm_squared();
    let c2 = rx2.v3().norm_squared();
    let cart2_tol = 4.0 * ((a1 + b1 + c1 + a2 + b2 + c2) / 6.0).sqrt() * cart_tol;
    if (a1 - a2).abs() > cart2_tol || (b1 - b2).abs() > cart2_tol || (c1 - c2).abs() > cart2_tol {
        return Ok(None);
    }

    // Then folded angles
    let alpha1 = folded_angle(&rx1.v2(), &rx1.v3());
    let beta1 = folded_angle(&rx1.v1(), &rx1.v3());
    let gamma1 = folded_angle(&rx1.v1(), &rx1.v2());
    let alpha2 = folded_angle(&rx2.v2(), &rx2.v3());
    let beta2 = folded_angle(&rx2.v1(), &rx2.v3());
    let gamma2 = folded_angle(&rx2.v1(), &rx2.v2());
    if (alpha1 - alpha2).abs() > angle_tol
        || (beta1 - beta2).abs() > angle_tol
        || (gamma1 - gamma2).abs() > angle_tol
    {
        return Ok(None);
    }

    // Reference basis: crystal 1's reduced cell vectors
    let ref_vecs = [rx1.v1(), rx1.v2(), rx1.v3()];

    // Pivot: the least frequent atom type
    let pivot_type = least_frequent_type(rx1.types());

    // Put one pivot atom of crystal 1 at the origin, then expand its cell
    // boundaries for matching stability
    let pivot_index = rx1
        .types()
        .iter()
        .position(|&t| t == pivot_type)
        .expect("pivot type comes from this type list");
    let ftrans = -rx1.fcoords()[pivot_index];
    let mut duplicates = DuplicateMap::new();
    rx1.translate_and_expand(&ftrans, cart_tol, &mut duplicates);

    // Super-cell of crystal 2's pivot atoms
    let super_pivots = build_super_pivot_list(&rx2, pivot_type, angle_tol);

    // Enumerate and test candidate transforms in generation order; the
    // first that matches every atom wins.
    let transforms = find_candidate_transforms(&super_pivots, &ref_vecs, cart_tol, angle_tol);
    for transform in transforms {
        if matches_with_transform(&rx1, &rx2, &duplicates, &transform, cart_tol) {
            return Ok(Some(transform));
        }
    }

    Ok(None)
}

/// The least frequent atomic number; ties resolve to the smallest number.
fn least_frequent_type(types: &[u32]) -> u32 {
    let mut counts = BTreeMap::new();
    for &t in types {
        *counts.entry(t).or_insert(0usize) += 1;
    }
    let (&pivot, _) = counts
        .iter()
        .min_by_key(|(_, &count)| count)
        .expect("type list is never empty");
    pivot
}

/// Replicate crystal 2's pivot atoms into a super-cell large enough that
/// any placement of crystal 1's reference frame yields candidate triplets
/// inside it: 3x3x3 when the cell diagonal is as long as a lattice vector
/// or the cell is hexagonal, 2x2x2 otherwise.
fn build_super_pivot_list(rx2: &ReducedXtal, pivot_type: u32, angle_tol: f64) -> Vec<Vector3<f64>> {
    let v1 = rx2.v1();
    let v2 = rx2.v2();
    let v3 = rx2.v3();
    let v1_sq = v1.norm_squared();
    let v2_sq = v2.norm_squared();
    let v3_sq = v3.norm_squared();
    let diag_sq = (v1 + v2 + v3).norm_squared();

    let diagonal_same_length_as_vector = (diag_sq - v1_sq).abs() < NORM_TOL
        || (diag_sq - v2_sq).abs() < NORM_TOL
        || (diag_sq - v3_sq).abs() < NORM_TOL;

    let cell_is_hexagonal = ((v1_sq - v2_sq).abs() < NORM_TOL
        && (folded_angle(&v1, &v2) - 60.0).abs() < angle_tol)
        || ((v1_sq - v3_sq).abs() < NORM_TOL
            && (folded_angle(&v1, &v3) - 60.0).abs() < angle_tol)
        || ((v2_sq - v3_sq).abs() < NORM_TOL
            && (folded_angle(&v2, &v3) - 60.0).abs() < angle_tol);

    let replication: i32 = if diagonal_same_length_as_vector || cell_is_hexagonal {
        3
    } else {
        2
    };

    let mut super_pivots = Vec::new();
    for (&t, ccoord) in rx2.types().iter().zip(rx2.ccoords()) {
        if t != pivot_type {
            continue;
        }
        for (i, j, k) in iproduct!(0..replication, 0..replication, 0..replication) {
            super_pivots.push(ccoord + (i as f64) * v1 + (j as f64) * v2 + (k as f64) * v3);
        }
    }
    super_pivots
}

/// For each pivot atom `o`, classify difference vectors to every other
/// pivot atom as candidates for the three reference vectors by squared
/// norm, then accept triples whose pairwise folded angles match the
/// reference frame. Each accepted triple yields the transform
/// "translate by -o, then rotate by `R = V * T^-1`".
fn find_candidate_transforms(
    super_pivots: &[Vector3<f64>],
    ref_vecs: &[Vector3<f64>; 3],
    cart_tol: f64,
    angle_tol: f64,
) -> Vec<RigidTransform> {
    let squared_tol = cart_tol * cart_tol;

    let v1_norm2 = ref_vecs[0].norm_squared();
    let v2_norm2 = ref_vecs[1].norm_squared();
    let v3_norm2 = ref_vecs[2].norm_squared();
    let ref_alpha = folded_angle(&ref_vecs[1], &ref_vecs[2]);
    let ref_beta = folded_angle(&ref_vecs[0], &ref_vecs[2]);
    let ref_gamma = folded_angle(&ref_vecs[0], &ref_vecs[1]);
    let v_mat = Matrix3::from_columns(ref_vecs);

    let mut transforms = Vec::new();

    let mut t1_candidates = Vec::new();
    let mut t2_candidates = Vec::new();
    let mut t3_candidates = Vec::new();

    for origin in super_pivots {
        t1_candidates.clear();
        t2_candidates.clear();
        t3_candidates.clear();
        for other in super_pivots {
            let t = other - origin;
            let t_norm2 = t.norm_squared();
            if (t_norm2 - v1_norm2).abs() < squared_tol {
                t1_candidates.push(t);
            }
            if (t_norm2 - v2_norm2).abs() < squared_tol {
                t2_candidates.push(t);
            }
            if (t_norm2 - v3_norm2).abs() < squared_tol {
                t3_candidates.push(t);
            }
        }
        if t1_candidates.is_empty() || t2_candidates.is_empty() || t3_candidates.is_empty() {
            continue;
        }

        for t1 in &t1_candidates {
            for t2 in &t2_candidates {
                if (folded_angle(t1, t2) - ref_gamma).abs() >= angle_tol {
                    continue;
                }
                for t3 in &t3_candidates {
                    if (folded_angle(t1, t3) - ref_beta).abs() >= angle_tol
                        || (folded_angle(t2, t3) - ref_alpha).abs() >= angle_tol
                    {
                        continue;
                    }
                    // R maps the candidate triple onto the reference frame:
                    // V = R T, so R = V * T^-1. Degenerate triples are
                    // skipped rather than aborted.
                    let t_mat = Matrix3::from_columns(&[*t1, *t2, *t3]);
                    if t_mat.determinant().abs() < NORM_TOL {
                        continue;
                    }
                    let t_inv = match t_mat.try_inverse() {
                        Some(inv) => inv,
                        None => continue,
                    };
                    let rotation = v_mat * t_inv;
                    let mut transform = RigidTransform::identity();
                    transform.rotate(&rotation);
                    transform.translate(&-origin);
                    transforms.push(transform);
                }
            }
        }
    }

    transforms
}

/// Apply `transform` to crystal 2 and sweep crystal 1 for a full matching:
/// every transformed atom must land within `cart_tol` of an unconsumed
/// crystal-1 atom of the same type. Consuming any member of a boundary
/// duplicate group consumes the whole group, so two distinct atoms cannot
/// both match images of a single physical atom.
fn matches_with_transform(
    rx1: &ReducedXtal,
    rx2: &ReducedXtal,
    duplicates: &DuplicateMap,
    transform: &RigidTransform,
    cart_tol: f64,
) -> bool {
    let transformed_cmat = transform.rotation() * rx2.cmat();
    let transformed_fmat = match transformed_cmat.try_inverse() {
        Some(m) => m,
        None => return false,
    };

    // Rebuild the transform to act on fractional coordinates: convert to
    // Cartesian on the right, back to the transformed fractional basis on
    // the left.
    let mut frac_transform = transform.clone();
    frac_transform.rotate(rx2.cmat());
    frac_transform.prerotate(&transformed_fmat);

    let tol_squared = cart_tol * cart_tol;
    let mut consumed = vec![false; rx1.num_atoms()];

    for (rx2_type, rx2_fcoord) in rx2.types().iter().zip(rx2.fcoords()) {
        let transformed = transformed_cmat * frac_transform.apply(rx2_fcoord);

        // Wrap into crystal 1's cell
        let mut frac1 = rx1.fmat() * transformed;
        wrap_fractional(&mut frac1);
        let cart1 = rx1.cmat() * frac1;

        let mut matched = false;
        for (idx, (rx1_type, rx1_ccoord)) in
            rx1.types().iter().zip(rx1.ccoords()).enumerate()
        {
            if rx1_type != rx2_type || consumed[idx] {
                continue;
            }
            if (cart1 - rx1_ccoord).norm_squared() > tol_squared {
                continue;
            }

            consumed[idx] = true;
            for (&pre, &(start, end)) in duplicates.iter() {
                if idx == pre || (start <= idx && idx <= end) {
                    consumed[pre] = true;
                    for slot in consumed[start..=end].iter_mut() {
                        *slot = true;
                    }
                }
            }
            matched = true;
            break;
        }

        if !matched {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use nalgebra::vector;

    use super::{folded_angle, least_frequent_type};

    #[test]
    fn test_folded_angle() {
        let x = vector![1.0, 0.0, 0.0];
        let y = vector![0.0, 1.0, 0.0];
        assert_relative_eq!(folded_angle(&x, &y), 90.0, epsilon = 1e-9);
        let mirrored = vector![-1.0, 1.0, 0.0];
        let reference = vector![1.0, 1.0, 0.0];
        assert_relative_eq!(
            folded_angle(&x, &reference),
            folded_angle(&x, &mirrored),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_least_frequent_type() {
        assert_eq!(least_frequent_type(&[1, 2, 2, 1, 3]), 3);
        // Ties resolve to the smallest atomic number
        assert_eq!(least_frequent_type(&[2, 1]), 1);
    }
}
