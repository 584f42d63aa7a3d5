use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
/// Error types for the **evoxtal** library
pub enum EvoxtalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Niggli reduction did not converge within the iteration budget")]
    LatticeNotReduced,
    #[error("Lattice is too ill-conditioned for Niggli reduction")]
    LatticeIllConditioned,
    #[error("Comparison failed: could not canonicalize an input lattice")]
    ComparisonFailed,
    #[error("Could not generate a valid candidate structure")]
    GenerationFailed,
    #[error("Optimizer backend error: {0}")]
    OptimizerError(String),
    #[error("Queue refresh timed out")]
    Timeout,
    #[error("Communication with the optimizer backend failed")]
    CommunicationError,
    #[error("Cannot write optimizer inputs to {0}")]
    CannotWrite(PathBuf),
    #[error("Job submission failed")]
    SubmitFailed,
    #[error("Malformed state file: {0}")]
    MalformedState(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Search run failed: {0}")]
    RunError(String),
}
