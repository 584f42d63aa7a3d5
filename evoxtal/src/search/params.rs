use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::genetic::CellLimits;

/// What to do with a crystal that exhausted its failure budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum FailAction {
    DoNothing,
    Kill,
    Randomize,
}

/// Every knob of a search run. Persisted to `run.state` and shared
/// (behind a lock) by the scheduler components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub description: String,
    /// Target stoichiometry: atomic number -> atom count per cell.
    pub composition: BTreeMap<u32, u32>,

    /// Structures in the first, unbred generation.
    pub num_initial: u32,
    /// Parents considered for breeding.
    pub pop_size: u32,
    /// Generation budget; the run ends at
    /// `num_initial + pop_size * gen_total` optimized structures.
    pub gen_total: u32,
    /// Target number of structures kept moving through the queue.
    pub cont_structs: u32,
    pub running_job_limit: u32,
    pub limit_running_jobs: bool,

    /// Operator weights in percent; evaluated in order
    /// crossover / stripple / permustrain.
    pub p_cross: u32,
    pub p_strip: u32,
    pub p_perm: u32,

    /// Minimum slab contribution of each crossover parent, percent.
    pub cross_min_contribution: f64,

    pub strip_amp_min: f64,
    pub strip_amp_max: f64,
    pub strip_per1: u32,
    pub strip_per2: u32,
    pub strip_strain_stdev_min: f64,
    pub strip_strain_stdev_max: f64,

    pub perm_ex: u32,
    pub perm_strain_stdev_max: f64,

    pub limits: CellLimits,

    /// Duplicate-sweep gates.
    pub tol_enthalpy: f64,
    pub tol_volume: f64,
    /// Definitive structure-comparison confirmation for duplicates.
    pub use_xtalcomp_confirmation: bool,
    pub xc_cart_tol: f64,
    pub xc_angle_tol: f64,

    pub spacegroup_tol: f64,

    pub fail_limit: u32,
    pub fail_action: FailAction,

    pub testing_mode: bool,
    /// Optimized-structure target per run in testing mode.
    pub test_structs: u32,

    pub queue_refresh_interval: Duration,
    pub queue_refresh_timeout: Duration,
    /// Ticks between duplicate sweeps.
    pub sweep_interval: u64,

    /// Local run directory holding one subdirectory per crystal.
    pub work_dir: PathBuf,
    /// Remote base path handed to templates.
    pub rem_path: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            description: String::new(),
            composition: BTreeMap::new(),
            num_initial: 20,
            pop_size: 20,
            gen_total: 10,
            cont_structs: 10,
            running_job_limit: 10,
            limit_running_jobs: true,
            p_cross: 50,
            p_strip: 35,
            p_perm: 15,
            cross_min_contribution: 25.0,
            strip_amp_min: 0.2,
            strip_amp_max: 0.8,
            strip_per1: 1,
            strip_per2: 2,
            strip_strain_stdev_min: 0.1,
            strip_strain_stdev_max: 0.5,
            perm_ex: 4,
            perm_strain_stdev_max: 0.5,
            limits: CellLimits::default(),
            tol_enthalpy: 1e-2,
            tol_volume: 1e-1,
            use_xtalcomp_confirmation: true,
            xc_cart_tol: 0.05,
            xc_angle_tol: 0.25,
            spacegroup_tol: 0.05,
            fail_limit: 2,
            fail_action: FailAction::Randomize,
            testing_mode: false,
            test_structs: 0,
            queue_refresh_interval: Duration::from_secs(10),
            queue_refresh_timeout: Duration::from_secs(30),
            sweep_interval: 10,
            work_dir: PathBuf::from("."),
            rem_path: String::new(),
        }
    }
}

impl SearchParams {
    /// The optimized-structure count at which the run terminates.
    pub fn structure_budget(&self) -> u32 {
        self.num_initial + self.pop_size * self.gen_total
    }
}
