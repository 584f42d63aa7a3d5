//! Genetic operators on periodic cells: crossover, stripple
//! (strain + ripple) and permustrain (strain + species exchange).
//!
//! Operators take fully optimized parents and return raw offspring; the
//! caller wraps them through the validity filter before acceptance. All
//! randomness comes from the injected generator.

use nalgebra::Matrix3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::base::Lattice;
use crate::model::{Atom, Crystal};

/// Cut-and-splice crossover: a fractional slab `[0, cut)` of parent A
/// joined with `[cut, 1)` of parent B along a random lattice direction,
/// with the cell matrices interpolated by the same fraction.
///
/// `min_contribution` (percent) keeps the cut away from the cell faces so
/// both parents contribute. Returns the offspring and parent A's
/// contribution in percent.
pub fn crossover<R: Rng + ?Sized>(
    rng: &mut R,
    parent_a: &Crystal,
    parent_b: &Crystal,
    min_contribution: f64,
) -> (Crystal, f64) {
    let axis = rng.gen_range(0..3usize);
    let min_frac = (min_contribution / 100.0).clamp(0.0, 0.5);
    let cut = rng.gen_range(min_frac..=(1.0 - min_frac));

    // Interpolate the cell matrices
    let basis = parent_a.lattice().basis * cut + parent_b.lattice().basis * (1.0 - cut);
    let mut child = Crystal::new(Lattice::from_column_basis(basis));

    let mut slab_a = parent_a.clone_structure();
    slab_a.wrap_atoms_to_cell();
    let mut slab_b = parent_b.clone_structure();
    slab_b.wrap_atoms_to_cell();

    for atom in slab_a.atoms() {
        if atom.frac[axis] < cut {
            child.add_atom(atom.atomic_number, atom.frac);
        }
    }
    for atom in slab_b.atoms() {
        if atom.frac[axis] >= cut {
            child.add_atom(atom.atomic_number, atom.frac);
        }
    }

    repair_composition(&mut child, parent_a, &slab_a, &slab_b, axis, cut);

    child.wrap_atoms_to_cell();
    (child, cut * 100.0)
}

/// Distance from fractional coordinate `u` to the cut plane, accounting
/// for the periodic images of the plane.
fn cut_plane_distance(u: f64, cut: f64) -> f64 {
    let d = (u - cut).abs();
    d.min((u - cut + 1.0).abs()).min((u - cut - 1.0).abs())
}

/// Restore the target stoichiometry after the splice: surplus atoms of a
/// species are deleted nearest the cut plane first; deficits are filled
/// with that species' atoms from the unused halves of the parents, again
/// nearest the cut plane first.
fn repair_composition(
    child: &mut Crystal,
    parent_a: &Crystal,
    slab_a: &Crystal,
    slab_b: &Crystal,
    axis: usize,
    cut: f64,
) {
    let target = parent_a.composition();

    for (&z, &want) in target.iter() {
        let mut have = child
            .composition()
            .get(&z)
            .copied()
            .unwrap_or(0);
        while have > want {
            let idx = child
                .atoms()
                .iter()
                .enumerate()
                .filter(|(_, a)| a.atomic_number == z)
                .min_by(|(_, x), (_, y)| {
                    cut_plane_distance(x.frac[axis], cut)
                        .total_cmp(&cut_plane_distance(y.frac[axis], cut))
                })
                .map(|(i, _)| i)
                .expect("surplus implies at least one atom of this species");
            child.remove_atom(idx);
            have -= 1;
        }
    }

    for (&z, &want) in target.iter() {
        let have = child.composition().get(&z).copied().unwrap_or(0);
        if have >= want {
            continue;
        }
        // Candidate donors come from the halves the splice left out
        let mut pool: Vec<&Atom> = slab_a
            .atoms()
            .iter()
            .filter(|a| a.atomic_number == z && a.frac[axis] >= cut)
            .chain(
                slab_b
                    .atoms()
                    .iter()
                    .filter(|a| a.atomic_number == z && a.frac[axis] < cut),
            )
            .collect();
        pool.sort_by(|x, y| {
            cut_plane_distance(x.frac[axis], cut).total_cmp(&cut_plane_distance(y.frac[axis], cut))
        });
        for atom in pool.into_iter().take((want - have) as usize) {
            child.add_atom(z, atom.frac);
        }
    }
}

/// Apply a random symmetric strain to the cell: each independent entry of
/// the strain tensor is drawn from N(0, sigma), off-diagonal entries
/// shared between the two symmetric slots. Fractional coordinates ride
/// along.
pub fn strain<R: Rng + ?Sized>(rng: &mut R, xtal: &mut Crystal, sigma: f64) {
    if sigma <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0, sigma).expect("sigma is positive and finite");
    let mut strain_mat = Matrix3::<f64>::identity();
    for i in 0..3 {
        for j in i..3 {
            let epsilon = normal.sample(rng);
            if i == j {
                strain_mat[(i, i)] += epsilon;
            } else {
                strain_mat[(i, j)] += 0.5 * epsilon;
                strain_mat[(j, i)] += 0.5 * epsilon;
            }
        }
    }
    let new_basis = strain_mat * xtal.lattice().basis;
    xtal.set_lattice_keeping_fractional(Lattice::from_column_basis(new_basis));
}

/// Displace every atom along one random lattice direction by the sum of
/// two cosine waves over the other two fractional axes, with periods
/// `per1`/`per2` and peak displacement `amplitude` (fractional units).
pub fn ripple<R: Rng + ?Sized>(
    rng: &mut R,
    xtal: &mut Crystal,
    amplitude: f64,
    per1: u32,
    per2: u32,
) {
    let axis = rng.gen_range(0..3usize);
    let u_axis = (axis + 1) % 3;
    let w_axis = (axis + 2) % 3;
    let phase1 = rng.gen_range(0.0..std::f64::consts::TAU);
    let phase2 = rng.gen_range(0.0..std::f64::consts::TAU);

    for i in 0..xtal.num_atoms() {
        let frac = xtal.atoms()[i].frac;
        let wave1 = (std::f64::consts::TAU * per1 as f64 * frac[u_axis] + phase1).cos();
        let wave2 = (std::f64::consts::TAU * per2 as f64 * frac[w_axis] + phase2).cos();
        let mut displaced = frac;
        displaced[axis] += 0.5 * amplitude * (wave1 + wave2);
        xtal.set_atom_frac(i, displaced);
    }
}

/// Swap the positions of `swaps` pairs of atoms of different species.
pub fn exchange<R: Rng + ?Sized>(rng: &mut R, xtal: &mut Crystal, swaps: u32) {
    let n = xtal.num_atoms();
    if n < 2 || xtal.composition().len() < 2 {
        return;
    }
    for _ in 0..swaps {
        for _ in 0..100 {
            let i = rng.gen_range(0..n);
            let j = rng.gen_range(0..n);
            if xtal.atoms()[i].atomic_number == xtal.atoms()[j].atomic_number {
                continue;
            }
            let fi = xtal.atoms()[i].frac;
            let fj = xtal.atoms()[j].frac;
            xtal.set_atom_frac(i, fj);
            xtal.set_atom_frac(j, fi);
            break;
        }
    }
}

/// Strain plus ripple. Samples sigma in `[sigma_min, sigma_max]` and the
/// wave amplitude in `[amp_min, amp_max]`; both are reported back for the
/// offspring's lineage description.
#[allow(clippy::too_many_arguments)]
pub fn stripple<R: Rng + ?Sized>(
    rng: &mut R,
    parent: &Crystal,
    sigma_min: f64,
    sigma_max: f64,
    amp_min: f64,
    amp_max: f64,
    per1: u32,
    per2: u32,
) -> (Crystal, f64, f64) {
    let sigma = rng.gen_range(sigma_min..=sigma_max);
    let amplitude = rng.gen_range(amp_min..=amp_max);

    let mut child = parent.clone_structure();
    strain(rng, &mut child, sigma);
    ripple(rng, &mut child, amplitude, per1, per2);
    child.wrap_atoms_to_cell();

    (child, sigma, amplitude)
}

/// Strain plus `exchanges` random same-position swaps between atoms of
/// different species. The sampled sigma is reported back.
pub fn permustrain<R: Rng + ?Sized>(
    rng: &mut R,
    parent: &Crystal,
    sigma_max: f64,
    exchanges: u32,
) -> (Crystal, f64) {
    let sigma = rng.gen_range(0.0..=sigma_max);

    let mut child = parent.clone_structure();
    strain(rng, &mut child, sigma);
    exchange(rng, &mut child, exchanges);
    child.wrap_atoms_to_cell();

    (child, sigma)
}

#[cfg(test)]
mod tests {
    use nalgebra::{vector, Matrix3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{crossover, exchange, permustrain, strain, stripple};
    use crate::base::Lattice;
    use crate::model::Crystal;

    fn parent(seed_shift: f64) -> Crystal {
        let mut xtal = Crystal::new(Lattice::new(Matrix3::identity() * 5.0));
        xtal.add_atom(12, vector![0.1 + seed_shift, 0.1, 0.1]);
        xtal.add_atom(12, vector![0.6, 0.6 + seed_shift, 0.6]);
        xtal.add_atom(8, vector![0.3, 0.8, 0.2 + seed_shift]);
        xtal.add_atom(8, vector![0.8, 0.3, 0.7]);
        xtal
    }

    #[test]
    fn test_crossover_preserves_composition() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = parent(0.0);
        let b = parent(0.13);
        for _ in 0..50 {
            let (child, percent_a) = crossover(&mut rng, &a, &b, 25.0);
            assert_eq!(child.composition(), a.composition());
            assert!((25.0..=75.0).contains(&percent_a));
        }
    }

    #[test]
    fn test_crossover_interpolates_cell() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = parent(0.0);
        let mut b = parent(0.13);
        b.rescale_to_volume(250.0);
        let (child, percent_a) = crossover(&mut rng, &a, &b, 25.0);
        let f = percent_a / 100.0;
        let expected = a.lattice().basis * f + b.lattice().basis * (1.0 - f);
        assert_relative_eq!(child.lattice().basis, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_strain_changes_cell_keeps_fracs() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut xtal = parent(0.0);
        let fracs_before: Vec<_> = xtal.atoms().iter().map(|a| a.frac).collect();
        strain(&mut rng, &mut xtal, 0.1);
        for (atom, before) in xtal.atoms().iter().zip(&fracs_before) {
            assert_relative_eq!(atom.frac, *before, epsilon = 1e-12);
            assert_relative_eq!(
                atom.cart,
                xtal.lattice().cartesian_coords(&atom.frac),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_stripple_reports_sampled_values() {
        let mut rng = StdRng::seed_from_u64(17);
        let xtal = parent(0.0);
        let (child, sigma, amplitude) = stripple(&mut rng, &xtal, 0.1, 0.5, 0.2, 0.8, 2, 3);
        assert!((0.1..=0.5).contains(&sigma));
        assert!((0.2..=0.8).contains(&amplitude));
        assert_eq!(child.composition(), xtal.composition());
        // The ripple must have moved something
        assert!(child
            .atoms()
            .iter()
            .zip(xtal.atoms())
            .any(|(c, p)| (c.frac - p.frac).norm() > 1e-9));
    }

    #[test]
    fn test_exchange_swaps_positions_not_types() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut xtal = parent(0.0);
        let before = xtal.composition();
        exchange(&mut rng, &mut xtal, 2);
        assert_eq!(xtal.composition(), before);
    }

    #[test]
    fn test_permustrain_preserves_composition() {
        let mut rng = StdRng::seed_from_u64(29);
        let xtal = parent(0.0);
        let (child, sigma) = permustrain(&mut rng, &xtal, 0.3, 2);
        assert!((0.0..=0.3).contains(&sigma));
        assert_eq!(child.composition(), xtal.composition());
    }
}
