//! Population-scale duplicate detection.
//!
//! Optimized structures are screened pairwise: a cheap fingerprint gate
//! (same spacegroup, enthalpy and volume within tolerance) followed by an
//! optional definitive structure comparison. The higher-enthalpy member
//! of a confirmed pair is tagged `Duplicate` with a back-link to the
//! survivor.

use log::warn;
use rayon::prelude::*;

use crate::base::Cell;
use crate::compare::compare;
use crate::model::{Fingerprint, Status};
use crate::search::events::{EventBus, SearchEvent};
use crate::search::params::SearchParams;
use crate::search::tracker::Tracker;

struct SweepItem {
    index: usize,
    generation: u32,
    id: u32,
    fingerprint: Fingerprint,
    cell: Cell,
}

/// Compare every pair of optimized crystals and tag confirmed duplicates.
/// Pair comparisons fan out on the rayon pool; status mutation happens
/// afterwards through the per-crystal write locks.
pub fn sweep(tracker: &Tracker, params: &SearchParams, events: &EventBus) {
    let items: Vec<SweepItem> = tracker
        .optimized_indices()
        .into_iter()
        .filter_map(|index| {
            let cell = tracker.get(index)?;
            let xtal = cell.read();
            Some(SweepItem {
                index,
                generation: xtal.generation,
                id: xtal.id,
                fingerprint: xtal.fingerprint(),
                cell: xtal.as_cell(),
            })
        })
        .collect();

    if items.len() < 2 {
        return;
    }

    let mut pairs = Vec::new();
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            pairs.push((i, j));
        }
    }

    // (loser, winner) slots; the loser carries the higher enthalpy
    let confirmed: Vec<(usize, usize)> = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let a = &items[i];
            let b = &items[j];
            if a.fingerprint.spacegroup != b.fingerprint.spacegroup {
                return None;
            }
            if (a.fingerprint.enthalpy - b.fingerprint.enthalpy).abs() >= params.tol_enthalpy {
                return None;
            }
            if (a.fingerprint.volume - b.fingerprint.volume).abs() >= params.tol_volume {
                return None;
            }
            if params.use_xtalcomp_confirmation {
                match compare(&a.cell, &b.cell, params.xc_cart_tol, params.xc_angle_tol) {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(err) => {
                        warn!(
                            "duplicate check {:05}x{:05} vs {:05}x{:05} failed ({err}); \
                             treating as distinct",
                            a.generation, a.id, b.generation, b.id
                        );
                        return None;
                    }
                }
            }
            if a.fingerprint.enthalpy <= b.fingerprint.enthalpy {
                Some((j, i))
            } else {
                Some((i, j))
            }
        })
        .collect();

    for (loser, winner) in confirmed {
        let Some(cell) = tracker.get(items[loser].index) else {
            continue;
        };
        let mut xtal = cell.write();
        // A crystal already tagged in this sweep stays with its first
        // surviving partner.
        if xtal.status != Status::Optimized {
            continue;
        }
        xtal.status = Status::Duplicate;
        xtal.duplicate_of = Some((items[winner].generation, items[winner].id));
        events.emit(SearchEvent::SimilarityFound {
            kept: (items[winner].generation, items[winner].id),
            duplicate: (items[loser].generation, items[loser].id),
        });
    }
}
