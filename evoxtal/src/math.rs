mod niggli;
pub mod stable;

pub use niggli::{is_niggli_reduced, niggli_reduce, standard_orientation, NIGGLI_ITERATIONS};
pub use stable::STABLE_TOL;
