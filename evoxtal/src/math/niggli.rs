//! Tolerance-aware Niggli reduction.
//!
//! Implements the numerically stable Krivy-Gruber iteration described in
//! Grosse-Kunstleve RW, Sauter NK, Adams PD, Acta Cryst. A60 (2004) 1-6,
//! tracking a change-of-basis matrix instead of rebuilding cell parameters,
//! so the orientation already present in the cell is untouched.

use nalgebra::{matrix, Matrix3};

use crate::base::EvoxtalError;
use crate::math::stable;

/// Iteration budget for the reduction loop.
pub const NIGGLI_ITERATIONS: u32 = 1000;

/// Reduce `basis` (columns are lattice vectors) to its Niggli cell.
///
/// Returns the reduced basis together with the accumulated change-of-basis
/// matrix `P` (determinant +-1) satisfying `reduced = basis * P`.
pub fn niggli_reduce(basis: &Matrix3<f64>) -> Result<(Matrix3<f64>, Matrix3<f64>), EvoxtalError> {
    let volume = basis.determinant().abs();
    if volume < 1e-12 {
        return Err(EvoxtalError::InvalidInput(
            "cell matrix is singular".to_string(),
        ));
    }

    let v1 = basis.column(0);
    let v2 = basis.column(1);
    let v3 = basis.column(2);

    // Characteristic (step 0)
    let mut a = v1.norm_squared();
    let mut b = v2.norm_squared();
    let mut c = v3.norm_squared();
    let mut xi = 2.0 * v2.dot(&v3);
    let mut eta = 2.0 * v1.dot(&v3);
    let mut zeta = 2.0 * v1.dot(&v2);

    let tol = stable::STABLE_TOL * volume.powf(1.0 / 3.0);

    // Swap a and b; negatives keep the determinant sign
    let c1 = matrix![
        0.0, -1.0, 0.0;
        -1.0, 0.0, 0.0;
        0.0, 0.0, -1.0;
    ];
    // Swap b and c
    let c2 = matrix![
        -1.0, 0.0, 0.0;
        0.0, 0.0, -1.0;
        0.0, -1.0, 0.0;
    ];
    // Step 8 shear
    let c8 = matrix![
        1.0, 0.0, 1.0;
        0.0, 1.0, 1.0;
        0.0, 0.0, 1.0;
    ];

    let mut cob = Matrix3::<f64>::identity();
    let mut converged = false;

    let mut iter = 0;
    'reduction: while iter < NIGGLI_ITERATIONS {
        iter += 1;

        // Step 1
        if stable::gt(a, b, tol)
            || (stable::eq(a, b, tol) && stable::gt(xi.abs(), eta.abs(), tol))
        {
            cob *= c1;
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut xi, &mut eta);
            iter += 1;
        }

        // Step 2
        if stable::gt(b, c, tol)
            || (stable::eq(b, c, tol) && stable::gt(eta.abs(), zeta.abs(), tol))
        {
            cob *= c2;
            std::mem::swap(&mut b, &mut c);
            std::mem::swap(&mut eta, &mut zeta);
            continue 'reduction;
        }

        // Steps 3 and 4 use exact comparisons; exactly one of them runs.
        if xi * eta * zeta > 0.0 {
            // Step 3
            cob *= Matrix3::from_diagonal(&nalgebra::vector![
                stable::sign(xi),
                stable::sign(eta),
                stable::sign(zeta)
            ]);
            xi = xi.abs();
            eta = eta.abs();
            zeta = zeta.abs();
            iter += 1;
        } else {
            // Step 4: choose signs i*j*k = -1, flipping the entry whose
            // characteristic value is exactly zero when needed.
            let mut i = 1.0;
            let mut j = 1.0;
            let mut k = 1.0;
            let mut zero_slot: Option<usize> = None;
            if xi > 0.0 {
                i = -1.0;
            } else if !(xi < 0.0) {
                zero_slot = Some(0);
            }
            if eta > 0.0 {
                j = -1.0;
            } else if !(eta < 0.0) {
                zero_slot = Some(1);
            }
            if zeta > 0.0 {
                k = -1.0;
            } else if !(zeta < 0.0) {
                zero_slot = Some(2);
            }
            if i * j * k < 0.0 {
                match zero_slot {
                    Some(0) => i = -1.0,
                    Some(1) => j = -1.0,
                    Some(2) => k = -1.0,
                    _ => return Err(EvoxtalError::LatticeIllConditioned),
                }
            }
            cob *= Matrix3::from_diagonal(&nalgebra::vector![i, j, k]);
            xi = -xi.abs();
            eta = -eta.abs();
            zeta = -zeta.abs();
            iter += 1;
        }

        // Step 5
        if stable::gt(xi.abs(), b, tol)
            || (stable::eq(xi, b, tol) && stable::lt(2.0 * eta, zeta, tol))
            || (stable::eq(xi, -b, tol) && stable::lt(zeta, 0.0, tol))
        {
            let s = stable::sign(xi);
            cob *= matrix![
                1.0, 0.0, 0.0;
                0.0, 1.0, -s;
                0.0, 0.0, 1.0;
            ];
            c = b + c - xi * s;
            eta -= zeta * s;
            xi -= 2.0 * b * s;
            continue 'reduction;
        }

        // Step 6
        if stable::gt(eta.abs(), a, tol)
            || (stable::eq(eta, a, tol) && stable::lt(2.0 * xi, zeta, tol))
            || (stable::eq(eta, -a, tol) && stable::lt(zeta, 0.0, tol))
        {
            let s = stable::sign(eta);
            cob *= matrix![
                1.0, 0.0, -s;
                0.0, 1.0, 0.0;
                0.0, 0.0, 1.0;
            ];
            c = a + c - eta * s;
            xi -= zeta * s;
            eta -= 2.0 * a * s;
            continue 'reduction;
        }

        // Step 7
        if stable::gt(zeta.abs(), a, tol)
            || (stable::eq(zeta, a, tol) && stable::lt(2.0 * xi, eta, tol))
            || (stable::eq(zeta, -a, tol) && stable::lt(eta, 0.0, tol))
        {
            let s = stable::sign(zeta);
            cob *= matrix![
                1.0, -s, 0.0;
                0.0, 1.0, 0.0;
                0.0, 0.0, 1.0;
            ];
            b = a + b - zeta * s;
            xi -= eta * s;
            zeta -= 2.0 * a * s;
            continue 'reduction;
        }

        // Step 8
        let sum_all_but_c = a + b + xi + eta + zeta;
        if stable::lt(sum_all_but_c, 0.0, tol)
            || (stable::eq(sum_all_but_c, 0.0, tol)
                && stable::gt(2.0 * (a + eta) + zeta, 0.0, tol))
        {
            cob *= c8;
            c += sum_all_but_c;
            xi += 2.0 * b + zeta;
            eta += 2.0 * a + zeta;
            continue 'reduction;
        }

        converged = true;
        break;
    }

    if !converged {
        return Err(EvoxtalError::LatticeNotReduced);
    }

    let reduced = basis * cob;
    debug_assert!(stable::eq(reduced.determinant().abs(), volume, tol));
    Ok((reduced, cob))
}

/// Check the Buerger conditions and the full Gruber (1973) Niggli
/// conditions on `basis` at tolerance `(V/3) * STABLE_TOL`.
pub fn is_niggli_reduced(basis: &Matrix3<f64>) -> bool {
    let v1 = basis.column(0);
    let v2 = basis.column(1);
    let v3 = basis.column(2);

    let a = v1.norm_squared();
    let b = v2.norm_squared();
    let c = v3.norm_squared();
    let xi = 2.0 * v2.dot(&v3);
    let eta = 2.0 * v1.dot(&v3);
    let zeta = 2.0 * v1.dot(&v2);

    let tol = stable::STABLE_TOL * (basis.determinant().abs() / 3.0);

    // Buerger conditions
    if stable::gt(a, b, tol) || stable::gt(b, c, tol) {
        return false;
    }
    if stable::eq(a, b, tol) && stable::gt(xi.abs(), eta.abs(), tol) {
        return false;
    }
    if stable::eq(b, c, tol) && stable::gt(eta.abs(), zeta.abs(), tol) {
        return false;
    }
    let all_positive = stable::gt(xi, 0.0, tol)
        && stable::gt(eta, 0.0, tol)
        && stable::gt(zeta, 0.0, tol);
    let all_non_positive = stable::leq(xi, 0.0, tol)
        && stable::leq(eta, 0.0, tol)
        && stable::leq(zeta, 0.0, tol);
    if !all_positive && !all_non_positive {
        return false;
    }

    // Gruber (1973) main and special conditions
    if stable::eq(xi, b, tol) && stable::gt(zeta, 2.0 * eta, tol) {
        return false;
    }
    if stable::eq(eta, a, tol) && stable::gt(zeta, 2.0 * xi, tol) {
        return false;
    }
    if stable::eq(zeta, a, tol) && stable::gt(eta, 2.0 * xi, tol) {
        return false;
    }
    if stable::eq(xi, -b, tol) && stable::neq(zeta, 0.0, tol) {
        return false;
    }
    if stable::eq(eta, -a, tol) && stable::neq(zeta, 0.0, tol) {
        return false;
    }
    if stable::eq(zeta, -a, tol) && stable::neq(eta, 0.0, tol) {
        return false;
    }
    if stable::eq(xi + eta + zeta + a + b, 0.0, tol)
        && stable::gt(2.0 * (a + eta) + zeta, 0.0, tol)
    {
        return false;
    }

    true
}

/// Rotate `basis` analytically into the standard orientation: the first
/// vector along +x, the second in the xy plane with positive y, and a
/// positive z component on the third.
pub fn standard_orientation(basis: &Matrix3<f64>) -> Matrix3<f64> {
    let (x1, y1, z1) = (basis[(0, 0)], basis[(1, 0)], basis[(2, 0)]);
    let (x2, y2, z2) = (basis[(0, 1)], basis[(1, 1)], basis[(2, 1)]);
    let (x3, y3, z3) = (basis[(0, 2)], basis[(1, 2)], basis[(2, 2)]);

    let l1 = (x1 * x1 + y1 * y1 + z1 * z1).sqrt();
    // Squared norms of the yz projections of v1 and v2
    let sqrdnorm1yz = y1 * y1 + z1 * z1;
    let sqrdnorm2yz = y2 * y2 + z2 * z2;
    // Determinant and scalar product of the yz projections
    let detv1v2yz = y2 * z1 - y1 * z2;
    let dotv1v2yz = y1 * y2 + z1 * z2;

    let mut new_mat = Matrix3::<f64>::zeros();

    new_mat[(0, 0)] = l1;

    new_mat[(0, 1)] = (x1 * x2 + y1 * y2 + z1 * z2) / l1;
    new_mat[(1, 1)] = (x2 * x2 * sqrdnorm1yz + detv1v2yz * detv1v2yz
        - 2.0 * x1 * x2 * dotv1v2yz
        + x1 * x1 * sqrdnorm2yz)
        .sqrt()
        / l1;

    new_mat[(0, 2)] = (x1 * x3 + y1 * y3 + z1 * z3) / l1;
    new_mat[(1, 2)] = (x1 * x1 * (y2 * y3 + z2 * z3)
        + x2 * (x3 * sqrdnorm1yz - x1 * (y1 * y3 + z1 * z3))
        + detv1v2yz * (y3 * z1 - y1 * z3)
        - x1 * x3 * dotv1v2yz)
        / (l1 * l1 * new_mat[(1, 1)]);
    // Numerator is the determinant of the original cell
    new_mat[(2, 2)] = (x1 * y2 * z3 - x1 * y3 * z2 + x2 * y3 * z1 - x2 * y1 * z3
        + x3 * y1 * z2
        - x3 * y2 * z1)
        / (l1 * new_mat[(1, 1)]);

    new_mat
}

#[cfg(test)]
mod tests {
    use nalgebra::{matrix, Matrix3};
    use rand::prelude::*;
    use rand::rngs::StdRng;

    use super::{is_niggli_reduced, niggli_reduce, standard_orientation};

    #[test]
    fn test_identity_characteristic() {
        let basis = Matrix3::<f64>::identity();
        let (reduced, cob) = niggli_reduce(&basis).unwrap();
        assert_relative_eq!(cob.determinant().abs(), 1.0, epsilon = 1e-10);
        let metric = reduced.transpose() * reduced;
        assert_relative_eq!(metric, Matrix3::identity(), epsilon = 1e-10);
        assert!(is_niggli_reduced(&reduced));
    }

    #[test]
    fn test_reduction_known_metric() {
        // The Krivy-Gruber worked example: this Gram matrix reduces to
        // the Niggli metric written out below.
        let gram = matrix![
            9.0, -11.0, -2.0;
            -11.0, 27.0, -2.5;
            -2.0, -2.5, 4.0;
        ];
        let basis = gram.cholesky().unwrap().l().transpose();

        let (reduced, cob) = niggli_reduce(&basis).unwrap();
        assert_relative_eq!(basis * cob, reduced, epsilon = 1e-10);
        assert_relative_eq!(cob.determinant().abs(), 1.0, epsilon = 1e-8);
        assert!(is_niggli_reduced(&reduced));

        let expected_metric = matrix![
            4.0, 2.0, 1.5;
            2.0, 9.0, 4.5;
            1.5, 4.5, 9.0;
        ];
        assert_relative_eq!(
            reduced.transpose() * reduced,
            expected_metric,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_reduction_random() {
        let mut rng: StdRng = SeedableRng::from_seed([0; 32]);

        for _ in 0..256 {
            let basis = Matrix3::<f64>::from_fn(|_, _| {
                let e: i8 = rng.gen();
                e as f64
            });
            if basis.determinant().abs() < 1.0 {
                continue;
            }
            let (reduced, cob) = niggli_reduce(&basis).unwrap();
            assert!(is_niggli_reduced(&reduced));
            assert_relative_eq!(basis * cob, reduced, epsilon = 1e-8);
            assert_relative_eq!(
                reduced.determinant().abs(),
                basis.determinant().abs(),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_standard_orientation_form() {
        let basis = matrix![
            3.0, 2.0, 2.0;
            0.0, 4.0, 5.0;
            0.0, 0.0, 3.0;
        ];
        let std_mat = standard_orientation(&basis);
        // Lower-left entries vanish, diagonal is positive
        assert_relative_eq!(std_mat[(1, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(std_mat[(2, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(std_mat[(2, 1)], 0.0, epsilon = 1e-12);
        assert!(std_mat[(0, 0)] > 0.0);
        assert!(std_mat[(1, 1)] > 0.0);
        // Vector lengths and the cell volume are preserved
        for i in 0..3 {
            assert_relative_eq!(
                std_mat.column(i).norm(),
                basis.column(i).norm(),
                epsilon = 1e-9
            );
        }
        assert_relative_eq!(
            std_mat.determinant().abs(),
            basis.determinant().abs(),
            epsilon = 1e-9
        );
    }
}
