use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::base::EvoxtalError;
use crate::model::Crystal;

/// Job state as reported by the local-optimizer back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum JobState {
    Unknown,
    Success,
    Error,
    Queued,
    Running,
    CommunicationError,
    Started,
    Pending,
}

/// Which optimizer family a back-end drives; used for labeling and
/// template selection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum OptimizerKind {
    Vasp,
    Gulp,
    Pwscf,
}

/// A point-in-time view of the remote queue: `(job_id, state_code)` pairs.
/// State codes are back-end specific; only the owning optimizer interprets
/// them.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub entries: Vec<(u64, String)>,
}

impl QueueSnapshot {
    pub fn state_code(&self, job_id: u64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| *id == job_id)
            .map(|(_, code)| code.as_str())
    }
}

/// The contract the scheduler consumes. Implementations own all transport
/// (input files, remote copies, queue commands) and are free to block;
/// the scheduler serializes its calls per crystal.
pub trait LocalOptimizer: Send + Sync {
    fn kind(&self) -> OptimizerKind;

    /// Number of optimization steps in the recipe.
    fn total_opt_steps(&self) -> u32;

    /// Write the input files for the crystal's current optimization step.
    fn write_inputs(&self, crystal: &Crystal) -> Result<(), EvoxtalError>;

    /// Submit the job; returns the job id on success.
    fn start(&self, crystal: &mut Crystal) -> Result<u64, EvoxtalError>;

    /// Interpret the queue snapshot (and any back-end state) for this
    /// crystal's job.
    fn status(&self, crystal: &Crystal, queue: &QueueSnapshot) -> JobState;

    /// Fetch a fresh queue snapshot, giving up after `timeout`.
    fn get_queue(&self, timeout: Duration) -> Result<QueueSnapshot, EvoxtalError>;

    /// Remove the crystal's job from the queue; unknown jobs are ignored.
    fn delete_job(&self, crystal: &mut Crystal) -> Result<(), EvoxtalError>;

    /// Read the optimizer outputs and update the crystal's cell, atoms,
    /// energy and enthalpy in place.
    fn update(&self, crystal: &mut Crystal) -> Result<(), EvoxtalError>;
}
