//! Validity filter for candidate structures.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::model::Crystal;

/// Inclusive range for one lattice parameter; `min == max` marks it fixed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }
}

/// Geometric acceptance window for candidate cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellLimits {
    pub a: ParamRange,
    pub b: ParamRange,
    pub c: ParamRange,
    pub alpha: ParamRange,
    pub beta: ParamRange,
    pub gamma: ParamRange,
    pub vol_min: f64,
    pub vol_max: f64,
    pub vol_fixed: f64,
    pub using_fixed_volume: bool,
    pub min_iad: f64,
    pub using_min_iad: bool,
}

impl Default for CellLimits {
    fn default() -> Self {
        Self {
            a: ParamRange::new(2.0, 12.0),
            b: ParamRange::new(2.0, 12.0),
            c: ParamRange::new(2.0, 12.0),
            alpha: ParamRange::new(60.0, 120.0),
            beta: ParamRange::new(60.0, 120.0),
            gamma: ParamRange::new(60.0, 120.0),
            vol_min: 10.0,
            vol_max: 500.0,
            vol_fixed: 100.0,
            using_fixed_volume: false,
            min_iad: 0.8,
            using_min_iad: false,
        }
    }
}

/// Angle window enforced after `fix_angles`, with a little numerical slack.
const ANGLE_LO: f64 = 60.0 - 1e-6;
const ANGLE_HI: f64 = 120.0 + 1e-6;

/// Accept or reject a candidate, applying the sanctioned repairs along the
/// way (parameter snapping, angle fixing, volume rescaling). Checks run in
/// a fixed order and short-circuit on the first failure.
pub fn check_crystal(
    xtal: &mut Crystal,
    limits: &CellLimits,
    target_composition: &BTreeMap<u32, u32>,
) -> bool {
    // 1. Lattice parameters in range, fixed parameters snapped first
    let (mut a, mut b, mut c) = xtal.lattice().lengths();
    let (mut alpha, mut beta, mut gamma) = xtal.lattice().angles();
    let fixed = [
        &limits.a,
        &limits.b,
        &limits.c,
        &limits.alpha,
        &limits.beta,
        &limits.gamma,
    ]
    .iter()
    .any(|r| r.is_fixed());
    if fixed {
        if limits.a.is_fixed() {
            a = limits.a.min;
        }
        if limits.b.is_fixed() {
            b = limits.b.min;
        }
        if limits.c.is_fixed() {
            c = limits.c.min;
        }
        if limits.alpha.is_fixed() {
            alpha = limits.alpha.min;
        }
        if limits.beta.is_fixed() {
            beta = limits.beta.min;
        }
        if limits.gamma.is_fixed() {
            gamma = limits.gamma.min;
        }
        xtal.rescale_cell_parameters(a, b, c, alpha, beta, gamma);
    }
    if !(limits.a.contains(a)
        && limits.b.contains(b)
        && limits.c.contains(c)
        && limits.alpha.contains(alpha)
        && limits.beta.contains(beta)
        && limits.gamma.contains(gamma))
    {
        debug!("candidate rejected: lattice parameters out of limits");
        return false;
    }

    // 2. Angles into [60, 120]
    if xtal.fix_angles().is_err() {
        debug!("candidate rejected: could not fix angles");
        return false;
    }
    let (alpha, beta, gamma) = xtal.lattice().angles();
    if ![alpha, beta, gamma]
        .iter()
        .all(|&x| (ANGLE_LO..=ANGLE_HI).contains(&x))
    {
        debug!("candidate rejected: angles escaped [60, 120]");
        return false;
    }

    // 3. Volume window, with the sanctioned rescues
    if limits.using_fixed_volume {
        xtal.rescale_to_volume(limits.vol_fixed);
    } else {
        let volume = xtal.volume();
        if volume < limits.vol_min || volume > limits.vol_max {
            // Deterministic pseudo-random rescale target drawn from the
            // fractional part of the volume itself
            let target = limits.vol_min + volume.fract().abs() * (limits.vol_max - limits.vol_min);
            xtal.rescale_to_volume(target);
        }
        let volume = xtal.volume();
        if volume < limits.vol_min || volume > limits.vol_max {
            debug!("candidate rejected: volume {volume} out of range");
            return false;
        }
    }

    // 4. Shortest interatomic distance
    if limits.using_min_iad {
        if let Some(shortest) = xtal.shortest_interatomic_distance() {
            if shortest < limits.min_iad {
                debug!("candidate rejected: IAD {shortest} below {}", limits.min_iad);
                return false;
            }
        }
    }

    // 5. Composition
    if &xtal.composition() != target_composition {
        debug!("candidate rejected: composition mismatch");
        return false;
    }

    true
}
