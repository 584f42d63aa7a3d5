pub mod elements;
mod crystal;
mod rank;

pub use crystal::{Atom, Crystal, Fingerprint, Status};
pub use rank::{probability_list, select_index, sort_by_enthalpy};
