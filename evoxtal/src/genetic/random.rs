//! Random structure generation within the configured limits.

use std::collections::BTreeMap;

use rand::Rng;

use crate::base::Lattice;
use crate::genetic::check::{CellLimits, ParamRange};
use crate::model::Crystal;

fn sample_param<R: Rng + ?Sized>(rng: &mut R, range: &ParamRange) -> f64 {
    if range.is_fixed() {
        range.min
    } else {
        rng.gen_range(range.min..=range.max)
    }
}

/// Draw a random cell within the lattice-parameter limits and fill it with
/// randomly placed atoms matching `composition`. Returns None when atom
/// placement cannot satisfy the minimum interatomic distance; callers
/// simply draw again.
pub fn random_crystal<R: Rng + ?Sized>(
    rng: &mut R,
    limits: &CellLimits,
    composition: &BTreeMap<u32, u32>,
) -> Option<Crystal> {
    let a = sample_param(rng, &limits.a);
    let b = sample_param(rng, &limits.b);
    let c = sample_param(rng, &limits.c);
    let alpha = sample_param(rng, &limits.alpha);
    let beta = sample_param(rng, &limits.beta);
    let gamma = sample_param(rng, &limits.gamma);

    let mut xtal = Crystal::new(Lattice::from_parameters(a, b, c, alpha, beta, gamma));

    if limits.using_fixed_volume {
        xtal.rescale_to_volume(limits.vol_fixed);
    } else {
        let volume = xtal.volume();
        if volume < limits.vol_min || volume > limits.vol_max {
            xtal.rescale_to_volume(rng.gen_range(limits.vol_min..=limits.vol_max));
        }
    }

    let min_iad = limits.using_min_iad.then_some(limits.min_iad);
    for (&atomic_number, &count) in composition.iter() {
        for _ in 0..count {
            if !xtal.add_atom_randomly(rng, atomic_number, min_iad, 100) {
                return None;
            }
        }
    }

    Some(xtal)
}
