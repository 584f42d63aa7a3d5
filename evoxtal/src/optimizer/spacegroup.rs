use crate::model::Crystal;

/// Optional external spacegroup lookup. Without a provider every
/// structure reports as P1.
pub trait SpacegroupProvider: Send + Sync {
    /// Returns `(number, symbol, html_symbol)` for the crystal at the
    /// given symmetry tolerance.
    fn spacegroup_of(&self, crystal: &Crystal, tol: f64) -> (u16, String, String);
}
