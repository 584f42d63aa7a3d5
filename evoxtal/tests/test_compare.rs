//! End-to-end equivalence scenarios for the structure comparator.

use approx::assert_relative_eq;
use evoxtal::base::{Cell, Lattice};
use evoxtal::compare::{compare, compare_with_transform};
use nalgebra::{matrix, vector, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CART_TOL: f64 = 0.05;
const ANGLE_TOL: f64 = 0.25;

/// Cell `[[3,0,0],[2,4,0],[2,5,3]]` (rows are lattice vectors) with four
/// atoms of two species.
fn simple_cell() -> Cell {
    Cell::new(
        Lattice::new(matrix![
            3.0, 0.0, 0.0;
            2.0, 4.0, 0.0;
            2.0, 5.0, 3.0;
        ]),
        vec![
            vector![0.0, 0.25, 0.25],
            vector![0.25, 0.25, 0.25],
            vector![0.0, 0.5, 0.25],
            vector![0.0, 0.25, 0.75],
        ],
        vec![1, 2, 2, 1],
    )
}

fn displaced_atom0(cell: &Cell) -> Cell {
    let mut out = cell.clone();
    out.positions[0] += vector![0.5, 0.0, 0.0];
    out
}

#[test]
fn simple_case() {
    let cell1 = simple_cell();
    let cell2 = simple_cell();
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn simple_case_emits_transform() {
    let cell1 = simple_cell();
    let cell2 = simple_cell();
    let transform = compare_with_transform(&cell1, &cell2, CART_TOL, ANGLE_TOL)
        .unwrap()
        .expect("identical cells must match");
    // Rigid: the rotation part is orthogonal up to tolerance
    let r = transform.rotation();
    assert_relative_eq!(
        (r.transpose() * r),
        Matrix3::identity(),
        epsilon = 1e-6
    );
}

/// Re-index the lattice by an integer linear combination and apply a
/// rigid transform; the structures stay equivalent.
#[test]
fn niggli_equivalent_description() {
    let cell1 = simple_cell();

    let lin_comb = matrix![
        1.0, 1.0, 0.0;
        1.0, 0.0, 1.0;
        0.0, 0.0, 1.0;
    ];
    let xform = matrix![
        0.0, -1.0, 0.0;
        1.0, 0.0, 0.0;
        0.0, 0.0, -1.0;
    ];

    // Work on the row-vector cell matrix as the description format does
    let rows = cell1.lattice.basis.transpose();
    let mut fcoord_update = xform * rows.transpose();
    let new_rows = lin_comb * rows * xform.transpose();
    fcoord_update = new_rows.transpose().try_inverse().unwrap() * fcoord_update;

    let positions2: Vec<Vector3<f64>> = cell1
        .positions
        .iter()
        .map(|p| fcoord_update * p)
        .collect();
    let cell2 = Cell::new(Lattice::new(new_rows), positions2, cell1.numbers.clone());

    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn uniform_translation() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();

    let mut rng = StdRng::seed_from_u64(0);
    let displacement = vector![rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
    for position in cell2.positions.iter_mut() {
        *position += displacement;
    }
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn integer_fractional_translation() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();
    for position in cell2.positions.iter_mut() {
        *position += vector![1.0, 2.0, -1.0];
    }
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

/// Per-atom noise of at most 0.005 angstrom stays well inside the 0.05
/// matching tolerance.
#[test]
fn small_random_noise() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();

    let cart = cell2.lattice.basis;
    let frac = cart.try_inverse().unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    for position in cell2.positions.iter_mut() {
        let mut disp = vector![rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
        disp = cart * disp;
        disp *= rng.gen::<f64>() * 0.005 / disp.norm();
        *position += frac * disp;
    }
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn all_perturbations_combined() {
    let cell1 = simple_cell();

    // Re-index
    let lin_comb = matrix![
        1.0, 1.0, 0.0;
        1.0, 0.0, 1.0;
        0.0, 0.0, 1.0;
    ];
    let xform = matrix![
        0.0, -1.0, 0.0;
        1.0, 0.0, 0.0;
        0.0, 0.0, -1.0;
    ];
    let rows = cell1.lattice.basis.transpose();
    let mut fcoord_update = xform * rows.transpose();
    let new_rows = lin_comb * rows * xform.transpose();
    fcoord_update = new_rows.transpose().try_inverse().unwrap() * fcoord_update;
    let mut positions2: Vec<Vector3<f64>> = cell1
        .positions
        .iter()
        .map(|p| fcoord_update * p)
        .collect();

    // Uniform translation
    let mut rng = StdRng::seed_from_u64(0);
    let displacement = vector![rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
    for position in positions2.iter_mut() {
        *position += displacement;
    }

    // Small noise
    let cart = new_rows.transpose();
    let frac = cart.try_inverse().unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    for position in positions2.iter_mut() {
        let mut disp = vector![rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
        disp = cart * disp;
        disp *= rng.gen::<f64>() * 0.005 / disp.norm();
        *position += frac * disp;
    }

    let cell2 = Cell::new(Lattice::new(new_rows), positions2, cell1.numbers.clone());
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

/// Hexagonal 12-atom cell with two pairs of equivalent atoms swapped in
/// the second description.
#[test]
fn hexagonal_cell() {
    let lattice = Lattice::new(matrix![
        3.8398, 0.0, 0.0;
        -1.9199, 3.32536, 0.0;
        0.0, 0.0, 5.93459;
    ]);
    let positions1 = vec![
        vector![0.33333, 0.66667, 0.56072],
        vector![0.66667, 0.33333, 0.43928],
        vector![0.66667, 0.33333, 0.06072],
        vector![0.33333, 0.66667, 0.93928],
        vector![0.16448, 0.83552, 0.25000],
        vector![0.83552, 0.16448, 0.75000],
        vector![0.00000, 0.00000, 0.00000],
        vector![0.00000, 0.00000, 0.50000],
        vector![0.16448, 0.32896, 0.25000],
        vector![0.83552, 0.67104, 0.75000],
        vector![0.67104, 0.83552, 0.25000],
        vector![0.32896, 0.16448, 0.75000],
    ];
    let types = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
    let cell1 = Cell::new(lattice.clone(), positions1.clone(), types.clone());

    let mut positions2 = positions1;
    positions2.swap(4, 8);
    positions2.swap(5, 9);
    let cell2 = Cell::new(lattice, positions2, types);

    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let cell2 = displaced_atom0(&cell2);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

/// Two populations differing by two atoms in a way that, after rotation
/// and wrapping, lands two distinct atoms on the same reference atom.
/// The duplicate-group bookkeeping must keep this from matching.
#[test]
fn overlap_after_wrap_regression() {
    let lattice = Lattice::new(matrix![
        5.79828, 0.0, 0.0;
        0.0, 5.79828, 0.0;
        0.0, 0.0, 8.2;
    ]);

    let positions1 = vec![
        vector![0.0, 0.0, 0.0],
        vector![0.0, 0.0, 0.5],
        vector![0.5, 0.5, 0.0],
        vector![0.5, 0.5, 0.5],
        vector![0.5, 0.0, 0.25],
        vector![0.5, 0.0, 0.75],
        vector![0.0, 0.5, 0.25],
        vector![0.0, 0.5, 0.75],
        vector![0.25, 0.25, 0.25],
        vector![0.25, 0.25, 0.75],
        vector![0.25, 0.75, 0.25],
        vector![0.25, 0.75, 0.75],
        vector![0.75, 0.25, 0.25],
        vector![0.75, 0.25, 0.75],
        vector![0.75, 0.75, 0.25],
        vector![0.75, 0.75, 0.75],
        vector![0.5, 0.0, 0.0],
        vector![0.5, 0.0, 0.5],
        vector![0.0, 0.5, 0.0],
        vector![0.0, 0.5, 0.5],
    ];
    let positions2 = vec![
        vector![0.0, 0.0, 0.0],
        vector![0.0, 0.0, 0.5],
        vector![0.5, 0.5, 0.0],
        vector![0.5, 0.5, 0.5],
        vector![0.5, 0.0, 0.25],
        vector![0.5, 0.0, 0.75],
        vector![0.0, 0.5, 0.25],
        vector![0.0, 0.5, 0.75],
        vector![0.25, 0.25, 0.25],
        vector![0.25, 0.25, 0.75],
        vector![0.25, 0.75, 0.25],
        vector![0.75, 0.25, 0.25],
        vector![0.75, 0.75, 0.25],
        vector![0.75, 0.75, 0.75],
        vector![0.5, 0.0, 0.0],
        vector![0.0, 0.5, 0.0],
        vector![0.25, 0.75, 0.75],
        vector![0.75, 0.25, 0.75],
        vector![0.5, 0.0, 0.5],
        vector![0.0, 0.5, 0.5],
    ];
    let types = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4];

    let cell1 = Cell::new(lattice.clone(), positions1, types.clone());
    let cell2 = Cell::new(lattice, positions2, types);

    assert!(!compare(&cell2, &cell1, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn symmetry_of_comparison() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();
    for position in cell2.positions.iter_mut() {
        *position += vector![0.1, 0.2, 0.3];
    }
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
    assert!(compare(&cell2, &cell1, CART_TOL, ANGLE_TOL).unwrap());
}

/// A mirrored copy (an enantiomorph) still compares equal.
#[test]
fn enantiomorph_matches() {
    let cell1 = simple_cell();
    let mirror = Matrix3::from_diagonal(&vector![-1.0, 1.0, 1.0]);
    let mirrored_rows = cell1.lattice.basis.transpose() * mirror;
    let cell2 = Cell::new(
        Lattice::new(mirrored_rows),
        cell1.positions.clone(),
        cell1.numbers.clone(),
    );
    assert!(compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn composition_prefilter() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();
    cell2.numbers[0] = 3;
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());

    let mut cell3 = simple_cell();
    cell3.positions.pop();
    cell3.numbers.pop();
    assert!(!compare(&cell1, &cell3, CART_TOL, ANGLE_TOL).unwrap());
}

#[test]
fn volume_prefilter() {
    let cell1 = simple_cell();
    let mut cell2 = simple_cell();
    cell2.lattice = Lattice::from_column_basis(cell2.lattice.basis * 1.1);
    assert!(!compare(&cell1, &cell2, CART_TOL, ANGLE_TOL).unwrap());
}
