mod cell;
mod error;
mod lattice;
mod transform;

pub use cell::{AtomicSpecie, Cell, Position};
pub use error::EvoxtalError;
pub use lattice::{Lattice, DEG_TO_RAD, RAD_TO_DEG};
pub use transform::RigidTransform;
